//! System model: components, their version sources and whole-system
//! configurations.

mod component;
mod configuration;
mod goal;
mod random;
mod source;

pub use component::{Component, ComponentError, is_valid_name};
pub use configuration::{ComponentState, Configuration, ConfigurationSnapshot};
pub use goal::{Goal, MAX_SCORE};
pub use random::{MODULUS, RandomStream};
pub use source::{
    ChangelogSource, GitSource, InlineSource, SourceError, VersionSource, VersionsFileSource,
};
