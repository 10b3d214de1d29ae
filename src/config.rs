//! Configuration du moniteur, chargée depuis du TOML (§ Configuration).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitorConfig {
    pub device: DeviceConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// Périphérique série auquel le récepteur GNSS est connecté, p.
    /// ex. `/dev/ttyUSB0`, ou un nœud `/dev/ppsN` déjà lié.
    pub path: String,

    /// Débit en bauds de la ligne série transportant les fix NMEA.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Tente la capture PPS noyau RFC2783 avant de retomber sur le
    /// chemin `TIOCMIWAIT` en espace utilisateur (§4.2).
    #[serde(default = "default_true")]
    pub attempt_kernel_pps: bool,

    /// Lignes de contrôle modem à surveiller pour le chemin en espace
    /// utilisateur (§4.3). Valeurs acceptées : "cd", "ri", "cts".
    #[serde(default = "default_monitored_lines")]
    pub monitored_lines: Vec<String>,

    /// Combien de réveils consécutifs à état inchangé avant que le
    /// refroidissement de ligne bloquée ne se déclenche (§4.4).
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,

    /// Durée du refroidissement une fois une ligne bloquée détectée,
    /// en secondes.
    #[serde(default = "default_stuck_cooldown_secs")]
    pub stuck_cooldown_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            attempt_kernel_pps: default_true(),
            monitored_lines: default_monitored_lines(),
            stuck_threshold: default_stuck_threshold(),
            stuck_cooldown_secs: default_stuck_cooldown_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Niveau passé à `tracing_subscriber::EnvFilter` quand aucun
    /// `RUST_LOG` n'est défini.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level() }
    }
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_true() -> bool {
    true
}
fn default_monitored_lines() -> Vec<String> {
    vec!["cd".to_string(), "ri".to_string(), "cts".to_string()]
}
fn default_stuck_threshold() -> u32 {
    crate::classifier::STUCK_THRESHOLD
}
fn default_stuck_cooldown_secs() -> u64 {
    crate::classifier::STUCK_COOLDOWN_SECS
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            device: DeviceConfig {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: default_baud_rate(),
            },
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let config: MonitorConfig = toml::from_str(&content).context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path.as_ref(), content).context("failed to write config file")?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.device.path.is_empty() {
            anyhow::bail!("device path must not be empty");
        }
        for line in &self.capture.monitored_lines {
            match line.as_str() {
                "cd" | "ri" | "cts" => {}
                other => anyhow::bail!("unknown modem line '{other}', expected cd/ri/cts"),
            }
        }
        if self.capture.monitored_lines.is_empty() {
            anyhow::bail!("at least one modem line must be monitored");
        }
        Ok(())
    }

    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
        #[cfg(target_os = "windows")]
        let default_path = "COM9".to_string();
        #[cfg(not(target_os = "windows"))]
        let default_path = "/dev/ttyUSB0".to_string();

        let example = MonitorConfig {
            device: DeviceConfig { path: default_path, baud_rate: default_baud_rate() },
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        };

        example.to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_modem_line_rejected() {
        let mut config = MonitorConfig::default();
        config.capture.monitored_lines = vec!["dsr".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_monitored_lines_rejected() {
        let mut config = MonitorConfig::default();
        config.capture.monitored_lines = vec![];
        assert!(config.validate().is_err());
    }
}
