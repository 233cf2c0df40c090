//! Jar manifest main attributes
//!
//! Only the main section (up to the first blank line) is read. A line that
//! starts with a single space continues the previous line. Attribute names
//! are matched case-insensitively.

/// Default manifest entry name
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Attribute carrying companion references
pub const CLASS_PATH: &str = "Class-Path";

/// Parsed main section of a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Manifest {
    /// Parse manifest bytes; malformed lines are skipped
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut logical: Vec<String> = Vec::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some(last) = logical.last_mut() {
                    last.push_str(continuation);
                }
                continue;
            }
            logical.push(line.to_string());
        }

        let attributes = logical
            .into_iter()
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim_start().to_string()))
            })
            .collect();

        Self { attributes }
    }

    /// Value of a main attribute
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whitespace-separated `Class-Path` references, in declaration order
    pub fn class_path(&self) -> Vec<String> {
        self.get(CLASS_PATH)
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// All main attributes in file order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
