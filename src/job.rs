use crate::dwf::AnalogInDriver;
use crate::error::ScopeError;
use crate::session::AcquisitionSession;
use crate::types::{SampleCount, SampleRate};
use std::time::Duration;

/// A trait for long-running processes that can succeed, fail, or timeout
///
/// Jobs represent processes like captures or monitoring loops that run for a
/// duration and produce a result.
pub trait Job {
    /// The type returned on successful completion
    type Output;

    /// Run the job with a timeout
    ///
    /// Returns:
    /// - `Ok(output)` if the job completes successfully
    /// - `Err(ScopeError)` if the job fails or times out
    fn run(&mut self, timeout: Duration) -> Result<Self::Output, ScopeError>;
}

/// A single capture bound to a session, runnable as a [`Job`]
///
/// The timeout passed to `run` replaces the session's configured timeout for
/// that run only.
pub struct CaptureJob<'a, D: AnalogInDriver> {
    session: &'a mut AcquisitionSession<D>,
    sample_count: SampleCount,
    sample_rate: SampleRate,
}

impl<'a, D: AnalogInDriver> CaptureJob<'a, D> {
    pub fn new(
        session: &'a mut AcquisitionSession<D>,
        sample_count: usize,
        sample_rate: f64,
    ) -> Result<Self, ScopeError> {
        Ok(Self {
            session,
            sample_count: SampleCount::new(sample_count)?,
            sample_rate: SampleRate::hz(sample_rate)?,
        })
    }

    /// Wall time the buffer itself takes to fill
    pub fn capture_duration(&self) -> Duration {
        self.sample_rate.duration_of(self.sample_count)
    }
}

impl<D: AnalogInDriver> Job for CaptureJob<'_, D> {
    type Output = Vec<f64>;

    fn run(&mut self, timeout: Duration) -> Result<Self::Output, ScopeError> {
        self.session
            .capture_with_timeout(self.sample_count, self.sample_rate, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::dwf::SimulatedDriver;
    use crate::session::CaptureSettings;

    struct TestJob {
        should_succeed: bool,
    }

    impl Job for TestJob {
        type Output = String;

        fn run(&mut self, timeout: Duration) -> Result<Self::Output, ScopeError> {
            if self.should_succeed {
                Ok("success".to_string())
            } else {
                Err(ScopeError::AcquisitionTimeout {
                    elapsed: timeout,
                    last_status: Default::default(),
                })
            }
        }
    }

    #[test]
    fn test_job_success() {
        let mut job = TestJob {
            should_succeed: true,
        };
        let result = job.run(Duration::from_secs(1)).unwrap();
        assert_eq!(result, "success");
    }

    #[test]
    fn test_job_failure() {
        let mut job = TestJob {
            should_succeed: false,
        };
        let result = job.run(Duration::from_secs(1));
        assert!(result.is_err());
    }

    fn simulated_session(polls_until_done: u32) -> AcquisitionSession<SimulatedDriver> {
        AcquisitionSession::new(
            SimulatedDriver::new(SimulationConfig {
                polls_until_done,
                ..Default::default()
            }),
            CaptureSettings::default(),
        )
    }

    #[test]
    fn test_capture_job_returns_samples() {
        let mut session = simulated_session(2);
        let mut job = CaptureJob::new(&mut session, 500, 50_000.0).unwrap();
        assert!((job.capture_duration().as_secs_f64() - 0.01).abs() < 1e-9);

        let samples = job.run(Duration::from_secs(1)).unwrap();
        assert_eq!(samples.len(), 500);
    }

    #[test]
    fn test_capture_job_validates_eagerly() {
        let mut session = simulated_session(2);
        assert!(matches!(
            CaptureJob::new(&mut session, 0, 1e4),
            Err(ScopeError::InvalidParameters(_))
        ));
        assert!(!session.driver().is_open());
    }

    #[test]
    fn test_capture_job_timeout_overrides_session() {
        // The simulator needs far more polls than a 5 ms budget allows
        let mut session = simulated_session(u32::MAX);
        let mut job = CaptureJob::new(&mut session, 10, 1e6).unwrap();

        let result = job.run(Duration::from_millis(5));

        assert!(matches!(result, Err(ScopeError::AcquisitionTimeout { .. })));
        assert!(!session.driver().is_open());
    }
}
