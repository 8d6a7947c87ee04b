use heck::ToUpperCamelCase;

/// An entity or operation name as declared, with the derived spellings the
/// renderer needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    raw: String,
}

impl Name {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Route segments and generated local variables.
    pub fn lower(&self) -> String {
        self.raw.to_lowercase()
    }

    /// Storage identifier: the name lowercased with an `s` appended.
    pub fn storage(&self) -> String {
        format!("{}s", self.lower())
    }

    /// Generated class name. Declarations are PascalCase by convention, but
    /// normalize anyway so lowercase declarations still render valid code.
    pub fn upper_camel(&self) -> String {
        self.raw.to_upper_camel_case()
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
