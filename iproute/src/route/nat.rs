use std::fmt;

pub const NAT_TABLE: &str = "nat";
pub const POSTROUTING: &str = "POSTROUTING";

/// A `MASQUERADE` rule in the `nat` table tagged with a comment marker.
///
/// An empty `source` or `output` means the match is not part of the rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HostNatRule {
    pub source: String,
    pub output: String,
}

impl HostNatRule {
    pub fn new(source: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
        }
    }

    /// Rule specification following `-A`/`-D POSTROUTING`.
    pub fn spec(&self, comment: &str) -> Vec<String> {
        let mut args = Vec::new();

        if !self.source.is_empty() {
            args.push("-s".to_owned());
            args.push(self.source.clone());
        }
        if !self.output.is_empty() {
            args.push("-o".to_owned());
            args.push(self.output.clone());
        }

        args.extend(
            ["-m", "comment", "--comment", comment, "-j", "MASQUERADE"]
                .iter()
                .map(|s| s.to_string()),
        );

        args
    }

    /// Parses one line of `iptables -t nat -S POSTROUTING`.
    ///
    /// Returns `None` unless the line appends a `MASQUERADE` rule carrying
    /// exactly the given comment.
    pub fn from_save_line(line: &str, comment: &str) -> Option<Self> {
        let tokens = split_save_line(line);
        let mut iter = tokens.iter().map(String::as_str);

        if iter.next() != Some("-A") || iter.next() != Some(POSTROUTING) {
            return None;
        }

        let mut rule = HostNatRule::default();
        let mut tagged = false;
        let mut masquerade = false;

        while let Some(token) = iter.next() {
            match token {
                "-s" => rule.source = iter.next()?.to_owned(),
                "-o" => rule.output = iter.next()?.to_owned(),
                "--comment" => tagged = iter.next()? == comment,
                "-j" => masquerade = iter.next()? == "MASQUERADE",
                _ => {}
            }
        }

        (tagged && masquerade).then_some(rule)
    }
}

impl fmt::Display for HostNatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.source.is_empty() {
            "any"
        } else {
            &self.source
        };
        let output = if self.output.is_empty() {
            "any"
        } else {
            &self.output
        };
        write!(f, "{} -> {}", source, output)
    }
}

// iptables quotes comments containing spaces.
fn split_save_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.trim().chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
