pub mod constants;
pub mod interface;
pub mod library;
pub mod simulator;

pub use interface::AnalogInDriver;
pub use library::DwfLibrary;
pub use simulator::SimulatedDriver;

use log::info;

use crate::config::DeviceConfig;
use crate::config::SimulationConfig;
use crate::error::ScopeError;

/// Pick the driver the configuration asks for
pub fn build_driver(
    device: &DeviceConfig,
    simulation: &SimulationConfig,
) -> Result<Box<dyn AnalogInDriver>, ScopeError> {
    if device.simulate {
        info!("Using simulated instrument");
        return Ok(Box::new(SimulatedDriver::new(simulation.clone())));
    }

    let library = match &device.library_path {
        Some(path) => DwfLibrary::load_from(path)?,
        None => DwfLibrary::load()?,
    };
    match library.version() {
        Ok(version) => info!("WaveForms runtime {}", version),
        Err(e) => log::warn!("Could not query WaveForms version: {}", e),
    }
    Ok(Box::new(library))
}
