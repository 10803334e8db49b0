use textplots::{Chart, Plot};

use crate::error::ScopeError;
use crate::types::TraceStats;

/// Anything that can present a captured trace
pub trait Renderer {
    fn render(&mut self, samples: &[f64], sample_rate: f64) -> Result<(), ScopeError>;
}

/// Determine the best scale and unit for a given maximum value
fn determine_scale(max_value: f64) -> (f64, &'static str) {
    if max_value >= 1.0 {
        (1.0, "")
    } else if max_value >= 1e-3 {
        (1e3, "m")
    } else if max_value >= 1e-6 {
        (1e6, "μ")
    } else if max_value >= 1e-9 {
        (1e9, "n")
    } else {
        (1e12, "p")
    }
}

/// Sample times in seconds, `index / sample_rate`
pub fn time_axis(len: usize, sample_rate: f64) -> Vec<f64> {
    (0..len).map(|i| i as f64 / sample_rate).collect()
}

fn check_trace(samples: &[f64], sample_rate: f64) -> Result<(), ScopeError> {
    if samples.is_empty() {
        return Err(ScopeError::Render("Cannot plot empty data".to_string()));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(ScopeError::Render(format!(
            "Cannot build a time axis at {} S/s",
            sample_rate
        )));
    }
    Ok(())
}

/// Voltage-over-time chart drawn to stdout
#[derive(Debug, Clone)]
pub struct TerminalRenderer {
    pub width: usize,
    pub height: usize,
    pub title: Option<String>,
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self {
            width: 140,
            height: 60,
            title: None,
        }
    }
}

impl TerminalRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, samples: &[f64], sample_rate: f64) -> Result<(), ScopeError> {
        check_trace(samples, sample_rate)?;

        // check_trace guarantees at least one sample
        let stats = TraceStats::from_samples(samples)
            .ok_or_else(|| ScopeError::Render("Cannot plot empty data".to_string()))?;
        let max_abs = stats.max.abs().max(stats.min.abs());
        let (value_scale, value_unit) = determine_scale(max_abs);

        let span = (samples.len() - 1) as f64 / sample_rate;
        let (time_scale, time_unit) = determine_scale(span);

        let frame: Vec<(f32, f32)> = time_axis(samples.len(), sample_rate)
            .into_iter()
            .zip(samples)
            .map(|(t, &v)| ((t * time_scale) as f32, (v * value_scale) as f32))
            .collect();

        // textplots needs a non-degenerate x range
        let x_max = ((span * time_scale) as f32).max(f32::EPSILON);

        println!("{}", self.title.as_deref().unwrap_or("Captured Trace"));
        println!("X-axis: Time ({}s) | Y-axis: Voltage ({}V)", time_unit, value_unit);
        println!(
            "{} samples at {} S/s | Values: {:.3} to {:.3} {}V",
            samples.len(),
            sample_rate,
            stats.min * value_scale,
            stats.max * value_scale,
            value_unit
        );
        println!("{}", "─".repeat(self.width));

        Chart::new(self.width as u32, self.height as u32, 0.0, x_max)
            .lineplot(&textplots::Shape::Lines(&frame))
            .nice();

        println!("Time ({}s) →", time_unit);

        Ok(())
    }
}

/// Plot a trace once with a throwaway [`TerminalRenderer`]
///
/// # Examples
/// ```
/// use ad2_scope::plotting::plot_waveform;
///
/// let trace = vec![0.1, 0.2, 0.15, 0.05];
/// plot_waveform(&trace, 1e4, Some("CH1"), 60, 20).unwrap();
/// ```
pub fn plot_waveform(
    samples: &[f64],
    sample_rate: f64,
    title: Option<&str>,
    width: usize,
    height: usize,
) -> Result<(), ScopeError> {
    let mut renderer = TerminalRenderer::new(width, height);
    if let Some(title) = title {
        renderer = renderer.with_title(title);
    }
    renderer.render(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingRenderer {
        frames: Vec<(Vec<f64>, f64)>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, samples: &[f64], sample_rate: f64) -> Result<(), ScopeError> {
            check_trace(samples, sample_rate)?;
            self.frames.push((samples.to_vec(), sample_rate));
            Ok(())
        }
    }

    #[test]
    fn test_determine_scale() {
        assert_eq!(determine_scale(5.0), (1.0, ""));
        assert_eq!(determine_scale(0.005), (1e3, "m"));
        assert_eq!(determine_scale(5e-6), (1e6, "μ"));
        assert_eq!(determine_scale(5e-9), (1e9, "n"));
        assert_eq!(determine_scale(5e-12), (1e12, "p"));
    }

    #[test]
    fn test_time_axis() {
        let t = time_axis(1000, 1e4);
        assert_eq!(t.len(), 1000);
        assert_eq!(t[0], 0.0);
        assert!((t[100] - 0.01).abs() < 1e-12);
        assert!((t[999] - 0.0999).abs() < 1e-12);
    }

    #[test]
    fn test_plot_waveform_basic() {
        let data = vec![0.1, 0.2, 0.15, 0.2, 0.1];
        assert!(plot_waveform(&data, 1e4, Some("Test Plot"), 60, 20).is_ok());
    }

    #[test]
    fn test_plot_single_sample() {
        assert!(plot_waveform(&[0.5], 1e3, None, 60, 20).is_ok());
    }

    #[test]
    fn test_plot_empty_data() {
        let data: Vec<f64> = vec![];
        assert!(matches!(
            plot_waveform(&data, 1e4, None, 60, 20),
            Err(ScopeError::Render(_))
        ));
    }

    #[test]
    fn test_plot_bad_rate() {
        let data = vec![1.0, 2.0];
        assert!(plot_waveform(&data, 0.0, None, 60, 20).is_err());
        assert!(plot_waveform(&data, f64::NAN, None, 60, 20).is_err());
    }

    #[test]
    fn test_renderer_sees_samples_unchanged() {
        let mut renderer = RecordingRenderer::default();
        let trace = vec![0.1, 0.2, 0.15];
        renderer.render(&trace, 1e4).unwrap();
        assert!(renderer.render(&[], 1e4).is_err());

        assert_eq!(renderer.frames, vec![(trace, 1e4)]);
    }
}
