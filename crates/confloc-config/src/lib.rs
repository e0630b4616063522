use serde::Deserialize;

/// Tool configuration merged from `confloc.toml` in the working directory
/// and the user config directory, first value wins per field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConflocConfig {
    /// System default language; also the first exported column.
    pub default_lang: Option<String>,
    /// Languages offered for export when the caller passes none.
    pub languages: Option<Vec<String>>,
    /// Directory holding the standard reference documents.
    pub standard_dir: Option<String>,
    pub export: Option<ExportCfg>,
    pub import: Option<ImportCfg>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportCfg {
    pub remove_markup: Option<bool>,
    /// CSV file with the active-country allow-list.
    pub country_list: Option<String>,
    /// Label-key table consulted for msgKey template fields.
    pub label_keys: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportCfg {
    /// Worksheet names to process; empty means every known sheet.
    pub worksheets: Option<Vec<String>>,
    pub label_keys: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Other(String),
}

pub fn load_config() -> Result<ConflocConfig, ConfigError> {
    // Search order: CWD/confloc.toml, $HOME/.config/confloc/confloc.toml
    let mut merged = ConflocConfig::default();
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(cfg) = read_config_file(&cwd.join("confloc.toml")) {
            merged = merge(merged, cfg);
        }
    }
    if let Some(base) = dirs::config_dir() {
        if let Some(cfg) = read_config_file(&base.join("confloc").join("confloc.toml")) {
            merged = merge(merged, cfg);
        }
    }
    Ok(merged)
}

fn read_config_file(path: &std::path::Path) -> Option<ConflocConfig> {
    let raw = std::fs::read_to_string(path).ok()?;
    toml::from_str::<ConflocConfig>(&raw).ok()
}

fn merge(mut a: ConflocConfig, b: ConflocConfig) -> ConflocConfig {
    if a.default_lang.is_none() {
        a.default_lang = b.default_lang;
    }
    if a.languages.is_none() {
        a.languages = b.languages;
    }
    if a.standard_dir.is_none() {
        a.standard_dir = b.standard_dir;
    }
    a.export = merge_opt(a.export, b.export, merge_export);
    a.import = merge_opt(a.import, b.import, merge_import);
    a
}

fn merge_opt<T: Default>(a: Option<T>, b: Option<T>, f: fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (None, Some(b)) => Some(b),
        (Some(a), None) => Some(a),
        (None, None) => None,
    }
}

fn merge_export(mut a: ExportCfg, b: ExportCfg) -> ExportCfg {
    if a.remove_markup.is_none() {
        a.remove_markup = b.remove_markup;
    }
    if a.country_list.is_none() {
        a.country_list = b.country_list;
    }
    if a.label_keys.is_none() {
        a.label_keys = b.label_keys;
    }
    a
}

fn merge_import(mut a: ImportCfg, b: ImportCfg) -> ImportCfg {
    if a.worksheets.is_none() {
        a.worksheets = b.worksheets;
    }
    if a.label_keys.is_none() {
        a.label_keys = b.label_keys;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_first_value() {
        let a: ConflocConfig = toml::from_str(
            "default_lang = \"en_US\"\n[export]\nremove_markup = true\n",
        )
        .unwrap();
        let b: ConflocConfig = toml::from_str(
            "default_lang = \"de_DE\"\nstandard_dir = \"/opt/standard\"\n\
             [export]\ncountry_list = \"countries.csv\"\n",
        )
        .unwrap();
        let merged = merge(a, b);
        assert_eq!(merged.default_lang.as_deref(), Some("en_US"));
        assert_eq!(merged.standard_dir.as_deref(), Some("/opt/standard"));
        let export = merged.export.unwrap();
        assert_eq!(export.remove_markup, Some(true));
        assert_eq!(export.country_list.as_deref(), Some("countries.csv"));
    }
}
