//! Pair manifests: which images go into which pair.
//!
//! ```toml
//! case = "APP001"
//!
//! [[pair]]
//! id = "kyc-kyc"
//! first = "kyc_front.jpg"
//! second = "kyc_back.jpg"
//! ```
//!
//! Relative image paths resolve against the manifest's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub case: Option<String>,
    #[serde(default, rename = "pair")]
    pub pairs: Vec<PairEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairEntry {
    pub id: String,
    pub first: Option<PathBuf>,
    pub second: Option<PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest = Self::parse(&text)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        if let Some(base) = path.parent() {
            manifest.resolve_against(base);
        }
        Ok(manifest)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn resolve_against(&mut self, base: &Path) {
        for entry in &mut self.pairs {
            for path in [&mut entry.first, &mut entry.second].into_iter().flatten() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

/// Parse a `--pair ID=FIRST,SECOND` argument. Either side may be left empty.
pub fn parse_pair_arg(arg: &str) -> Result<PairEntry, String> {
    let (id, images) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected ID=FIRST,SECOND, got '{arg}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing pair id in '{arg}'"));
    }
    let (first, second) = images.split_once(',').unwrap_or((images, ""));
    let path = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| PathBuf::from(s))
    };
    Ok(PairEntry {
        id: id.to_string(),
        first: path(first),
        second: path(second),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let m = Manifest::parse(
            r#"
            case = "APP001"

            [[pair]]
            id = "kyc-kyc"
            first = "a.jpg"
            second = "/abs/b.jpg"

            [[pair]]
            id = "kyc-rtp"
            first = "c.jpg"
            "#,
        )
        .unwrap();
        assert_eq!(m.case.as_deref(), Some("APP001"));
        assert_eq!(m.pairs.len(), 2);
        assert!(m.pairs[1].second.is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Manifest::parse("[[pair]]\nid = \"x\"\nthird = \"c.jpg\"").is_err());
    }

    #[test]
    fn test_resolve_relative_paths() {
        let mut m = Manifest::parse(
            "[[pair]]\nid = \"kyc-kyc\"\nfirst = \"a.jpg\"\nsecond = \"/abs/b.jpg\"",
        )
        .unwrap();
        m.resolve_against(Path::new("/cases/app1"));
        assert_eq!(m.pairs[0].first, Some(PathBuf::from("/cases/app1/a.jpg")));
        assert_eq!(m.pairs[0].second, Some(PathBuf::from("/abs/b.jpg")));
    }

    #[test]
    fn test_parse_pair_arg() {
        let e = parse_pair_arg("kyc-kyc=a.jpg,b.jpg").unwrap();
        assert_eq!(e.id, "kyc-kyc");
        assert_eq!(e.first, Some(PathBuf::from("a.jpg")));
        assert_eq!(e.second, Some(PathBuf::from("b.jpg")));

        let e = parse_pair_arg("kyc-rtp=a.jpg").unwrap();
        assert!(e.second.is_none());

        let e = parse_pair_arg("kyc-rtp=,b.jpg").unwrap();
        assert!(e.first.is_none());
        assert_eq!(e.second, Some(PathBuf::from("b.jpg")));

        assert!(parse_pair_arg("no-equals").is_err());
        assert!(parse_pair_arg("=a.jpg,b.jpg").is_err());
    }
}
