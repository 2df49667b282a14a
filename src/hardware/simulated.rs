// src/hardware/simulated.rs - Virtual chamber for offline runs
use super::{Chamber, ChamberError, ChamberInfo, ClimaState, Fracs, SlewRate, TemperatureRating};
use async_trait::async_trait;

const INITIAL_TEMPERATURE: f64 = 20.0;

/// Follows every setpoint instantly, without physical limits.
#[derive(Debug, Clone)]
pub struct SimChamber {
    last_set_temp: f64,
}

impl SimChamber {
    pub fn new() -> Self {
        Self {
            last_set_temp: INITIAL_TEMPERATURE,
        }
    }
}

impl Default for SimChamber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Chamber for SimChamber {
    async fn open(&mut self, interface: Option<&str>) -> Result<(), ChamberError> {
        if let Some(interface) = interface {
            return Err(ChamberError::Configuration(format!(
                "Interface '{}' not used in sim mode",
                interface
            )));
        }
        tracing::info!("Simulated chamber opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChamberError> {
        tracing::info!("Simulated chamber closed");
        Ok(())
    }

    async fn start(&mut self, temperature: Option<f64>) -> Result<(), ChamberError> {
        if let Some(temperature) = temperature {
            self.last_set_temp = temperature;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ChamberError> {
        Ok(())
    }

    fn info(&self) -> ChamberInfo {
        ChamberInfo {
            name: "SIM".to_string(),
            fracs: Fracs {
                temperature: 2,
                humidity: 2,
            },
            temperature: TemperatureRating {
                min: f64::NEG_INFINITY,
                max: f64::INFINITY,
                unit: "c",
            },
            slew_rate: SlewRate {
                rise: f64::INFINITY,
                fall: f64::NEG_INFINITY,
                unit: "c/min",
            },
        }
    }

    async fn get_clima(&mut self) -> Result<ClimaState, ChamberError> {
        Ok(ClimaState::with_temperature(self.last_set_temp))
    }

    async fn set_clima(&mut self, clima: &ClimaState) -> Result<(), ChamberError> {
        let temperature = clima.temperature.ok_or(ChamberError::MissingTemperature)?;
        self.last_set_temp = temperature;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_interface() {
        let mut sim = SimChamber::new();
        assert!(matches!(
            sim.open(Some("/dev/ttyUSB0")).await,
            Err(ChamberError::Configuration(_))
        ));
        assert!(sim.open(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_and_get_clima() {
        let mut sim = SimChamber::new();
        sim.open(None).await.unwrap();
        sim.start(None).await.unwrap();
        assert_eq!(sim.get_clima().await.unwrap().temperature, Some(20.0));

        sim.set_clima(&ClimaState::with_temperature(25.0)).await.unwrap();
        let clima = sim.get_clima().await.unwrap();
        assert_eq!(clima.temperature, Some(25.0));
        assert!(clima.humidity.is_nan());
    }

    #[tokio::test]
    async fn test_set_clima_without_temperature_keeps_state() {
        let mut sim = SimChamber::new();
        sim.set_clima(&ClimaState::with_temperature(30.0)).await.unwrap();
        assert!(matches!(
            sim.set_clima(&ClimaState::default()).await,
            Err(ChamberError::MissingTemperature)
        ));
        assert_eq!(sim.get_clima().await.unwrap().temperature, Some(30.0));
    }

    #[tokio::test]
    async fn test_start_with_temperature() {
        let mut sim = SimChamber::new();
        sim.start(Some(-10.0)).await.unwrap();
        assert_eq!(sim.get_clima().await.unwrap().temperature, Some(-10.0));
        let info = sim.info();
        assert_eq!(info.fracs.temperature, 2);
        assert!(info.slew_rate.rise.is_infinite());
    }
}
