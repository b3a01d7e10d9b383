//! Cordova iOS build SDK
//!
//! `cordova-build-ios-sdk` automates the iOS build of a Cordova project: it
//! makes sure the iOS platform exists, runs the native build, finds the app
//! the build produced and, if asked, packages it into an installable `.ipa`.
//!
//! Everything that compiles, signs or scaffolds is done by external tools
//! (the `cordova` CLI and `zip`). This crate owns the decisions around them:
//!
//! - **Provisioning** - whether `platforms/ios` must be removed and/or added
//!   before building ([`provision`])
//! - **Artifact lookup** - which entry of the build output directory was
//!   produced by this build, judged by modification time ([`locator`])
//!
//! # Quick Start
//!
//! ```no_run
//! use cordova_build_ios_sdk::builders::{IosBuilder, find_project_root};
//! use cordova_build_ios_sdk::BuildConfiguration;
//!
//! fn main() -> Result<(), cordova_build_ios_sdk::BuildError> {
//!     let root = find_project_root("./my-app".as_ref())?;
//!     let config = BuildConfiguration {
//!         release: true,
//!         device: true,
//!         ..Default::default()
//!     };
//!
//!     let report = IosBuilder::new(root).build(&config)?;
//!     if let Some(artifact) = report.artifact {
//!         println!("App: {:?}", artifact.path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! An invocation is strictly sequential. Two invocations against the same
//! project root must not overlap: they would race on `platforms/ios` and on
//! the timestamp-based artifact lookup.

// Public modules
pub mod builders;
pub mod locator;
pub mod provision;
pub mod toolchain;
pub mod types;

// Re-export key types for convenience
pub use builders::{IosBuilder, Packager, ZipPackager};
pub use locator::{BuildWindow, ScanReport, SkippedEntry};
pub use provision::{PlatformState, ProvisionPlan, ProvisionStep};
pub use toolchain::{CordovaCli, Toolchain};
pub use types::{
    BuildConfiguration, BuildError, BuildProfile, BuildReport, EmittedArtifact, EntryKind,
    LocatedArtifact, PLATFORM, PLUGIN_NAME,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
