//! Output naming
//!
//! Maps a build target to its artifact filename and converts between the
//! short library ids used in configuration (`easel`) and display names used
//! in log output (`EaselJS`).

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Suffix appended to artifacts built on the next channel
pub const NEXT_SUFFIX: &str = "-NEXT";

/// Suffix carried by every display name
const DISPLAY_SUFFIX: &str = "JS";

/// Module format of an output artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// ES module, consumed by modern toolchains as-is
    #[value(name = "module")]
    Esm,
    /// CommonJS, `module.exports`
    #[value(name = "cjs")]
    CommonJs,
    /// Browser global, assigned into a namespace object
    Global,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Esm, Format::CommonJs, Format::Global];

    /// Filename segment for this format, `None` for the default global build
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Format::Esm => Some("module"),
            Format::CommonJs => Some("cjs"),
            Format::Global => None,
        }
    }

    /// Name used for the bundle task of this format
    pub fn task_name(self) -> &'static str {
        match self {
            Format::Esm => "bundle:module",
            Format::CommonJs => "bundle:cjs",
            Format::Global => "bundle:global",
        }
    }

    /// Whether the output needs syntax downleveling for older runtimes
    pub fn needs_downlevel(self) -> bool {
        !matches!(self, Format::Esm)
    }

    /// ES module output is never run through the minifier
    pub fn allows_minify(self) -> bool {
        !matches!(self, Format::Esm)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Esm => "module",
            Format::CommonJs => "cjs",
            Format::Global => "global",
        };
        f.write_str(name)
    }
}

/// Release channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Stable,
    Next,
}

impl Channel {
    pub fn from_next_flag(next: bool) -> Self {
        if next {
            Channel::Next
        } else {
            Channel::Stable
        }
    }

    pub fn is_next(self) -> bool {
        matches!(self, Channel::Next)
    }
}

/// One desired output artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildTarget {
    pub format: Format,
    pub minified: bool,
    pub channel: Channel,
}

impl BuildTarget {
    pub fn new(format: Format, minified: bool, channel: Channel) -> Self {
        Self {
            format,
            minified,
            channel,
        }
    }

    /// Artifact filename for this target; also the bundle cache key
    pub fn filename(&self, library: &str) -> String {
        build_filename(library, self.channel, self.format.suffix(), self.minified)
    }

    /// Whether the minifier runs for this target
    pub fn applies_minifier(&self) -> bool {
        self.minified && self.format.allows_minify()
    }
}

/// `<library>[-NEXT][.<suffix>][.min].js`
pub fn build_filename(
    library: &str,
    channel: Channel,
    format_suffix: Option<&str>,
    minified: bool,
) -> String {
    let mut name = String::from(library);
    if channel.is_next() {
        name.push_str(NEXT_SUFFIX);
    }
    if let Some(suffix) = format_suffix {
        name.push('.');
        name.push_str(suffix);
    }
    if minified {
        name.push_str(".min");
    }
    name.push_str(".js");
    name
}

/// `easel` -> `EaselJS`
pub fn to_display_name(library_id: &str) -> String {
    if library_id.ends_with(DISPLAY_SUFFIX) {
        return library_id.to_string();
    }

    let mut chars = library_id.chars();
    match chars.next() {
        Some(first) => {
            let mut name: String = first.to_uppercase().collect();
            name.push_str(chars.as_str());
            name.push_str(DISPLAY_SUFFIX);
            name
        }
        None => String::new(),
    }
}

/// `EaselJS` -> `easel`. Names without the `JS` suffix pass through untouched.
pub fn to_short_id(display_name: &str) -> String {
    match display_name.strip_suffix(DISPLAY_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_lowercase(),
        _ => display_name.to_string(),
    }
}
