use serde::Serialize;

/// One settable property, as listed for help output and documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    /// Wire name, e.g. `db.pool_size`, `servers[<n>].host`, `labels.<xxx>`.
    pub name: String,
    /// Type label, e.g. `string`, `integer(uint16)` or a type name.
    pub type_name: String,
    /// Whether the property can be set from an environment variable.
    pub can_be_env_var: bool,
    /// The type is listed but not described here.
    pub undocumented: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl PropertyDescriptor {
    /// Environment variable that sets this property, given the variable
    /// prefix used by the environment source.
    pub fn env_var_name(&self, prefix: &str) -> Option<String> {
        if !self.can_be_env_var {
            return None;
        }
        let mut name = String::new();
        if !prefix.is_empty() {
            name.push_str(prefix.trim_end_matches(['.', '_']));
            name.push('_');
        }
        name.push_str(&self.name.replace('.', "_"));
        Some(name.to_uppercase())
    }
}
