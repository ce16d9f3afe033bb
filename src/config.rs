//! Caller-supplied configuration for opening a file. There is no on-disk
//! or environment-derived configuration, only this in-process value.

use crate::platform::Platform;
use typed_builder::TypedBuilder;

/// Options controlling how the Reader/Writer façade opens a file.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct Config {
    /// If set, opening a file whose platform does not match this one
    /// (ignoring `compiler`) is a fatal open error.
    #[builder(default, setter(strip_option))]
    pub expected_platform: Option<Platform>,

    /// Whether unknown/opaque section and segment kinds should be
    /// tolerated (the default) rather than rejected outright. This editor
    /// never interprets such kinds regardless; `lenient = false` is for
    /// callers that want to fail fast on anything they don't recognize.
    #[builder(default = true)]
    pub lenient: bool,
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_lenient_with_no_expected_platform() {
        let config = Config::builder().build();
        assert!(config.lenient);
        assert!(config.expected_platform.is_none());
    }

    #[test]
    fn builder_accepts_an_expected_platform() {
        let config = Config::builder().expected_platform(Platform::native_platform()).build();
        assert!(config.expected_platform.is_some());
    }
}
