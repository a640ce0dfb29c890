//! Window and renderer configuration.

use crate::error::{Error, Result};
use crate::method::TransparencyMethod;

/// Environment variable consulted for the method when none is given on the
/// command line.
pub const METHOD_ENV: &str = "STRATA_METHOD";

/// Fragment slots per pixel unless configured otherwise.
pub const DEFAULT_FRAGMENT_CAPACITY: u32 = 8;

/// Configuration for the sample window and renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Transparency method active at startup.
    pub method: TransparencyMethod,
    /// Clear color of the lighting target, linear RGB.
    pub background: [f32; 3],
    /// Requested fragment slots per pixel for the K-buffer capture pass.
    /// The renderer may lower it to fit device limits.
    pub fragment_capacity: u32,
    pub vsync: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Strata".to_string(),
            width: 1280,
            height: 720,
            method: TransparencyMethod::default(),
            background: [0.02, 0.02, 0.03],
            fragment_capacity: DEFAULT_FRAGMENT_CAPACITY,
            vsync: true,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn method(mut self, method: TransparencyMethod) -> Self {
        self.method = method;
        self
    }

    pub fn background(mut self, background: [f32; 3]) -> Self {
        self.background = background;
        self
    }

    pub fn fragment_capacity(mut self, capacity: u32) -> Self {
        self.fragment_capacity = capacity.max(1);
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Builds a configuration from command line arguments (without the
    /// program name):
    ///
    /// ```text
    /// [METHOD] [--capacity N] [--size WxH] [--no-vsync]
    /// ```
    ///
    /// `env_method` is used when no positional method is given; pass the
    /// value of [`METHOD_ENV`].
    pub fn from_args<I, S>(args: I, env_method: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        let mut method = None;
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "--capacity" => {
                    let value = next_value(&mut args, "--capacity")?;
                    let capacity = value.parse::<u32>().ok().filter(|c| *c > 0).ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "--capacity expects a positive integer, got `{value}`"
                        ))
                    })?;
                    config.fragment_capacity = capacity;
                }
                "--size" => {
                    let value = next_value(&mut args, "--size")?;
                    let (width, height) = parse_size(&value)?;
                    config.width = width;
                    config.height = height;
                }
                "--no-vsync" => config.vsync = false,
                flag if flag.starts_with("--") => {
                    return Err(Error::InvalidArgument(format!("unknown flag `{flag}`")));
                }
                name => {
                    if method.is_some() {
                        return Err(Error::InvalidArgument(format!(
                            "unexpected extra argument `{name}`"
                        )));
                    }
                    method = Some(name.parse::<TransparencyMethod>()?);
                }
            }
        }

        config.method = match (method, env_method) {
            (Some(method), _) => method,
            (None, Some(name)) => name.parse()?,
            (None, None) => config.method,
        };
        Ok(config)
    }
}

fn next_value<I, S>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    args.next()
        .map(|value| value.as_ref().to_string())
        .ok_or_else(|| Error::InvalidArgument(format!("{flag} needs a value")))
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let invalid = || Error::InvalidArgument(format!("--size expects WIDTHxHEIGHT, got `{value}`"));
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.parse::<u32>().map_err(|_| invalid())?;
    let height = height.parse::<u32>().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<AppConfig> {
        AppConfig::from_args(args.iter().copied(), None)
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn reads_method_and_flags() {
        let args = ["kbuffer2", "--capacity", "12", "--size", "640x480", "--no-vsync"];
        let config = parse(&args).unwrap();
        assert_eq!(config.method, TransparencyMethod::KBuffer2);
        assert_eq!(config.fragment_capacity, 12);
        assert_eq!((config.width, config.height), (640, 480));
        assert!(!config.vsync);
    }

    #[test]
    fn positional_method_beats_environment() {
        let config = AppConfig::from_args(["alpha"], Some("kbuffer4")).unwrap();
        assert_eq!(config.method, TransparencyMethod::AlphaBlending);

        let config = AppConfig::from_args(Vec::<String>::new(), Some("2")).unwrap();
        assert_eq!(config.method, TransparencyMethod::KBuffer2);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(parse(&["--capacity", "0"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse(&["--capacity"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse(&["--size", "800"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse(&["--size", "0x600"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse(&["--fast"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse(&["alpha", "kbuffer4"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse(&["sorted"]), Err(Error::UnknownMethod(_))));
    }

    #[test]
    fn builder_clamps_capacity() {
        let config = AppConfig::new().fragment_capacity(0).size(320, 200).title("t");
        assert_eq!(config.fragment_capacity, 1);
        assert_eq!(config.title, "t");
    }
}
