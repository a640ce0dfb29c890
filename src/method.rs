//! Transparency method selection.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::kbuffer::LayerCount;

/// How translucent geometry is composited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransparencyMethod {
    /// Hardware alpha blending in submission order. Wrong wherever
    /// translucent surfaces intersect or are drawn front to back.
    AlphaBlending,
    /// Two-layer K-buffer.
    KBuffer2,
    /// Four-layer K-buffer.
    #[default]
    KBuffer4,
}

impl TransparencyMethod {
    pub const ALL: [TransparencyMethod; 3] = [
        TransparencyMethod::AlphaBlending,
        TransparencyMethod::KBuffer2,
        TransparencyMethod::KBuffer4,
    ];

    /// Number of K-buffer layers, or `None` for plain alpha blending.
    pub fn layer_count(self) -> Option<LayerCount> {
        match self {
            TransparencyMethod::AlphaBlending => None,
            TransparencyMethod::KBuffer2 => Some(LayerCount::Two),
            TransparencyMethod::KBuffer4 => Some(LayerCount::Four),
        }
    }

    pub fn uses_kbuffer(self) -> bool {
        self.layer_count().is_some()
    }

    /// Human readable label shown in the window title.
    pub fn label(self) -> &'static str {
        match self {
            TransparencyMethod::AlphaBlending => "Alpha Blending",
            TransparencyMethod::KBuffer2 => "2-Layer K-Buffer",
            TransparencyMethod::KBuffer4 => "4-Layer K-Buffer",
        }
    }

    /// The next method in cycling order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            TransparencyMethod::AlphaBlending => TransparencyMethod::KBuffer2,
            TransparencyMethod::KBuffer2 => TransparencyMethod::KBuffer4,
            TransparencyMethod::KBuffer4 => TransparencyMethod::AlphaBlending,
        }
    }
}

impl fmt::Display for TransparencyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransparencyMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "alpha" | "alphablending" | "blend" | "0" => Ok(TransparencyMethod::AlphaBlending),
            "kbuffer2" | "2layer" | "2" => Ok(TransparencyMethod::KBuffer2),
            "kbuffer4" | "4layer" | "4" => Ok(TransparencyMethod::KBuffer4),
            _ => Err(Error::UnknownMethod(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycling_visits_every_method_once() {
        let mut method = TransparencyMethod::AlphaBlending;
        let mut seen = Vec::new();
        for _ in 0..TransparencyMethod::ALL.len() {
            seen.push(method);
            method = method.next();
        }
        assert_eq!(method, TransparencyMethod::AlphaBlending);
        assert_eq!(seen, TransparencyMethod::ALL);
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!(
            "alpha".parse::<TransparencyMethod>().unwrap(),
            TransparencyMethod::AlphaBlending
        );
        assert_eq!(
            "K-Buffer_2".parse::<TransparencyMethod>().unwrap(),
            TransparencyMethod::KBuffer2
        );
        assert_eq!(
            " 4 ".parse::<TransparencyMethod>().unwrap(),
            TransparencyMethod::KBuffer4
        );
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "depth-peeling".parse::<TransparencyMethod>().unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(name) if name == "depth-peeling"));
    }

    #[test]
    fn layer_counts() {
        assert_eq!(TransparencyMethod::AlphaBlending.layer_count(), None);
        assert_eq!(
            TransparencyMethod::KBuffer2.layer_count(),
            Some(LayerCount::Two)
        );
        assert_eq!(
            TransparencyMethod::KBuffer4.layer_count(),
            Some(LayerCount::Four)
        );
        assert!(!TransparencyMethod::AlphaBlending.uses_kbuffer());
    }
}
