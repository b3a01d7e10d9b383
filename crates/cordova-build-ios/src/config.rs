//! Configuration file support for cordova-build-ios.
//!
//! This module provides support for `cordova-build-ios.toml` files that let a
//! project persist its build options instead of passing CLI flags every time.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The project directory (`./cordova-build-ios.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! ## Example Configuration
//!
//! ```toml
//! [build]
//! release = true
//! device = true
//! re_add_platform = false
//! version = "6.2.0"
//! output_archive = "dist/app.ipa"
//!
//! [signing]
//! code_sign_identity = "iPhone Distribution"
//! provisioning_profile = "00000000-0000-0000-0000-000000000000"
//!
//! [toolchain]
//! cordova = "npx cordova"
//! zip = "zip"
//! timeout_secs = 3600
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "cordova-build-ios.toml";

/// Root configuration structure for `cordova-build-ios.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Build options.
    pub build: BuildSection,

    /// Code signing options.
    pub signing: SigningSection,

    /// External tools.
    pub toolchain: ToolchainSection,
}

/// Build options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Build with `--release`.
    pub release: bool,

    /// Build for a device and collect the produced app.
    pub device: bool,

    /// Remove and add the iOS platform before every build.
    pub re_add_platform: bool,

    /// cordova-ios version to add, e.g. "6.2.0".
    pub version: Option<String>,

    /// Package the device build into this `.ipa`, relative to the project root.
    pub output_archive: Option<PathBuf>,
}

/// Code signing options written to `build.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    /// Code signing identity.
    pub code_sign_identity: Option<String>,

    /// Provisioning profile UUID.
    pub provisioning_profile: Option<String>,
}

/// External tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSection {
    /// Command line used to run Cordova; may include a launcher (`npx cordova`).
    ///
    /// Defaults to "cordova".
    pub cordova: String,

    /// Program used to create `.ipa` archives.
    ///
    /// Defaults to "zip".
    pub zip: String,

    /// Kill any external command running longer than this many seconds.
    ///
    /// No timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            cordova: "cordova".to_string(),
            zip: "zip".to_string(),
            timeout_secs: None,
        }
    }
}

impl ToolchainSection {
    /// Splits [`Self::cordova`] into a program and its leading arguments.
    pub fn cordova_command(&self) -> (String, Vec<String>) {
        let mut parts = self.cordova.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "cordova".to_string());
        (program, parts.collect())
    }
}

impl FileConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: FileConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes comments explaining each configuration option.
    pub fn generate_starter_toml() -> String {
        r#"# cordova-build-ios configuration file
# CLI flags override these settings when provided.

[build]
# Build with --release
release = false

# Build for a device and collect the produced app
device = false

# Remove and add the iOS platform before every build
re_add_platform = false

# cordova-ios version to add (optional, defaults to the toolchain's pinned version)
# version = "6.2.0"

# Package the device build's .app into this .ipa (optional, requires device = true)
# output_archive = "dist/app.ipa"

[signing]
# Both values are required; they are written to build.json before building
# code_sign_identity = "iPhone Distribution"
# provisioning_profile = "00000000-0000-0000-0000-000000000000"

[toolchain]
# Command used to run Cordova (a launcher such as "npx cordova" works too)
cordova = "cordova"

# Program used to create .ipa archives
zip = "zip"

# Kill any external command running longer than this (optional)
# timeout_secs = 3600
"#
        .to_string()
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<FileConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads an explicit config file, or discovers one from `project_dir`.
    pub fn new(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self {
                config: Some(FileConfig::load_from_file(path)?),
                config_path: Some(path.to_path_buf()),
            });
        }
        match FileConfig::discover_from(project_dir)? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Returns the build section, or defaults.
    pub fn build(&self) -> BuildSection {
        self.config
            .as_ref()
            .map(|c| c.build.clone())
            .unwrap_or_default()
    }

    /// Returns the signing section, or defaults.
    pub fn signing(&self) -> SigningSection {
        self.config
            .as_ref()
            .map(|c| c.signing.clone())
            .unwrap_or_default()
    }

    /// Returns the toolchain section, or defaults.
    pub fn toolchain(&self) -> ToolchainSection {
        self.config
            .as_ref()
            .map(|c| c.toolchain.clone())
            .unwrap_or_default()
    }

    /// Resolves the command timeout, preferring the CLI value.
    pub fn timeout(&self, cli_secs: Option<u64>) -> Option<Duration> {
        self.resolve(cli_secs.map(Some), |c| Some(c.toolchain.timeout_secs), None)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&FileConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert!(!config.build.release);
        assert!(!config.build.device);
        assert_eq!(config.toolchain.cordova, "cordova");
        assert_eq!(config.toolchain.zip, "zip");
        assert_eq!(config.toolchain.timeout_secs, None);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(
            &config_path,
            r#"
[build]
release = true
device = true
version = "6.2.0"
output_archive = "dist/app.ipa"

[signing]
code_sign_identity = "iPhone Distribution"
provisioning_profile = "abc-123"

[toolchain]
cordova = "npx cordova"
timeout_secs = 900
"#,
        )
        .unwrap();

        let config = FileConfig::load_from_file(&config_path).unwrap();

        assert!(config.build.release);
        assert!(config.build.device);
        assert!(!config.build.re_add_platform);
        assert_eq!(config.build.version.as_deref(), Some("6.2.0"));
        assert_eq!(
            config.build.output_archive,
            Some(PathBuf::from("dist/app.ipa"))
        );
        assert_eq!(
            config.signing.code_sign_identity.as_deref(),
            Some("iPhone Distribution")
        );
        assert_eq!(config.toolchain.zip, "zip");
        assert_eq!(config.toolchain.timeout_secs, Some(900));
        assert_eq!(
            config.toolchain.cordova_command(),
            ("npx".to_string(), vec!["cordova".to_string()])
        );
    }

    #[test]
    fn test_discover_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[build]\ndevice = true\n").unwrap();
        let nested = temp_dir.path().join("www");
        std::fs::create_dir(&nested).unwrap();

        let (config, path) = FileConfig::discover_from(&nested).unwrap().unwrap();
        assert!(config.build.device);
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = FileConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[build]\nrelease = \"yes\"\n").unwrap();

        assert!(FileConfig::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_config_resolver() {
        let mut config = FileConfig::default();
        config.build.version = Some("5.1.1".into());
        config.toolchain.timeout_secs = Some(600);
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: None,
        };

        // CLI value takes precedence
        let version = resolver.resolve(Some("6.0.0".to_string()), |c| c.build.version.clone(), String::new());
        assert_eq!(version, "6.0.0");

        // Config value used when CLI is None
        let version = resolver.resolve(None, |c| c.build.version.clone(), String::new());
        assert_eq!(version, "5.1.1");

        assert_eq!(resolver.timeout(None), Some(Duration::from_secs(600)));
        assert_eq!(resolver.timeout(Some(30)), Some(Duration::from_secs(30)));
        assert_eq!(resolver.timeout(Some(0)), None);
        assert_eq!(ConfigResolver::default().timeout(None), None);
    }

    #[test]
    fn test_generate_starter_toml_parses() {
        let toml = FileConfig::generate_starter_toml();
        let parsed: FileConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, FileConfig::default());
    }
}
