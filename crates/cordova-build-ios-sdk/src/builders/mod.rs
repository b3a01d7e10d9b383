//! Build automation for the Cordova iOS platform.
//!
//! ## Overview
//!
//! [`IosBuilder`] drives one invocation end to end:
//!
//! 1. **Provisioning** - Add (or remove and re-add) `platforms/ios`
//! 2. **Signing** - Write `build.json` when an identity and a profile are given
//! 3. **Native build** - `cordova build ios` with `--release` / `--device`
//! 4. **Artifact lookup** - Find the app the device build just produced
//! 5. **Packaging** - Optionally zip the `.app` bundle into an `.ipa`
//!
//! ## Common Utilities
//!
//! The `common` module provides shared functionality:
//!
//! - Cordova project root lookup and well-known platform paths
//! - Command execution with captured stderr and an optional timeout
//!
//! ## Example
//!
//! ```no_run
//! use cordova_build_ios_sdk::builders::{IosBuilder, ZipPackager, find_project_root};
//! use cordova_build_ios_sdk::toolchain::CordovaCli;
//! use cordova_build_ios_sdk::BuildConfiguration;
//! use std::time::Duration;
//!
//! let root = find_project_root(".".as_ref())?;
//! let timeout = Some(Duration::from_secs(3600));
//! let builder = IosBuilder::new(root)
//!     .with_toolchain(CordovaCli::new("cordova").timeout(timeout))
//!     .with_packager(ZipPackager::default().timeout(timeout));
//!
//! let config = BuildConfiguration {
//!     release: true,
//!     device: true,
//!     output_archive_path: Some("dist/app.ipa".into()),
//!     ..Default::default()
//! };
//! builder.build(&config)?;
//! # Ok::<(), cordova_build_ios_sdk::BuildError>(())
//! ```

pub mod common;
pub mod ios;

pub use common::{device_output_dir, find_project_root, platform_dir};
pub use ios::{
    BUILD_CONFIG_FILE, BuildConfigFile, BuildPlan, IosBuilder, Packager, ZipPackager, build_flags,
};
