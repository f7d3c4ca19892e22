use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DashError, DashResult};

const DEFAULT_CONFIG_NAME: &str = "segment-dash.toml";
const CONFIG_ENV: &str = "SEGMENT_DASH_CONFIG";

/// Rows an XLSX worksheet holds below its header row.
pub const XLSX_MAX_DATA_ROWS: u64 = 1_048_575;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where the dataset comes from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
    /// Name of the environment variable holding the hub token.
    pub token_env: String,
    /// Skip the hub and read this file instead.
    pub local_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repo_id: "WillianAlencar/SegmentacaoClientes".into(),
            filename: "data/train-00000-of-00001.parquet".into(),
            revision: "main".into(),
            token_env: "HF_TOKEN".into(),
            local_path: None,
        }
    }
}

/// Dataset column used for each filter role. `None` disables the role.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnsConfig {
    pub identifier: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub sector: Option<String>,
    pub spend: Option<String>,
    pub purchase_date: Option<String>,
    pub signup_date: Option<String>,
    pub flag: Option<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            identifier: "id_cliente".into(),
            name: Some("nome".into()),
            category: Some("categoria".into()),
            sector: Some("setor".into()),
            spend: Some("valor_gasto".into()),
            purchase_date: Some("data_ultima_compra".into()),
            signup_date: Some("data_cadastro".into()),
            flag: Some("status".into()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Hard ceiling on rows returned by sample/top queries.
    pub sample_ceiling: u64,
    /// Maximum distinct values cached per selection widget.
    pub distinct_cap: u64,
    /// Rows fetched per export batch.
    pub batch_size: u64,
    pub max_batch_size: u64,
    /// XLSX exports above this estimated row count are refused up front.
    pub xlsx_row_ceiling: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            sample_ceiling: 1_000,
            distinct_cap: 500,
            batch_size: 50_000,
            max_batch_size: 100_000,
            xlsx_row_ceiling: 1_000_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub file_prefix: String,
    pub gzip_csv: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_prefix: "clientes_filtrados".into(),
            gzip_csv: false,
        }
    }
}

// ---------------------------------------------------------------------------
// DashboardConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub source: SourceConfig,
    pub columns: ColumnsConfig,
    pub limits: LimitsConfig,
    pub export: ExportConfig,
}

impl DashboardConfig {
    /// Load from `$SEGMENT_DASH_CONFIG`, else `./segment-dash.toml`, else defaults.
    pub fn discover() -> DashResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_NAME);
        if local.exists() {
            return Self::load(local);
        }
        log::info!("no {DEFAULT_CONFIG_NAME} found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load(path: &Path) -> DashResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| DashError::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_toml(&text)?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> DashResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| DashError::Config(format!("parsing TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DashResult<()> {
        let l = &self.limits;
        let positive = [
            ("sample_ceiling", l.sample_ceiling),
            ("distinct_cap", l.distinct_cap),
            ("batch_size", l.batch_size),
            ("max_batch_size", l.max_batch_size),
            ("xlsx_row_ceiling", l.xlsx_row_ceiling),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(DashError::Config(format!("limits.{name} must be greater than 0")));
            }
        }
        if l.batch_size > l.max_batch_size {
            return Err(DashError::Config(format!(
                "limits.batch_size ({}) exceeds limits.max_batch_size ({})",
                l.batch_size, l.max_batch_size
            )));
        }
        if l.xlsx_row_ceiling > XLSX_MAX_DATA_ROWS {
            return Err(DashError::Config(format!(
                "limits.xlsx_row_ceiling ({}) exceeds the {XLSX_MAX_DATA_ROWS} data rows an XLSX sheet holds",
                l.xlsx_row_ceiling
            )));
        }
        if self.columns.identifier.trim().is_empty() {
            return Err(DashError::Config("columns.identifier must not be empty".into()));
        }
        Ok(())
    }

    /// The hub token, read from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.source.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = DashboardConfig::from_toml(
            r#"
            [columns]
            identifier = "customer_id"
            flag = "churned"

            [limits]
            batch_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.columns.identifier, "customer_id");
        assert_eq!(config.columns.flag.as_deref(), Some("churned"));
        assert_eq!(config.columns.category.as_deref(), Some("categoria"));
        assert_eq!(config.limits.batch_size, 10);
        assert_eq!(config.limits.sample_ceiling, 1_000);
        assert_eq!(config.source, SourceConfig::default());
    }

    #[test]
    fn rejects_zero_limits() {
        let err = DashboardConfig::from_toml("[limits]\nsample_ceiling = 0\n").unwrap_err();
        assert!(err.to_string().contains("sample_ceiling"));
    }

    #[test]
    fn rejects_batch_above_max() {
        let err = DashboardConfig::from_toml("[limits]\nbatch_size = 200\nmax_batch_size = 100\n")
            .unwrap_err();
        assert!(matches!(err, DashError::Config(_)));
    }

    #[test]
    fn rejects_xlsx_ceiling_beyond_sheet_capacity() {
        let err = DashboardConfig::from_toml("[limits]\nxlsx_row_ceiling = 1048576\n").unwrap_err();
        assert!(err.to_string().contains("xlsx_row_ceiling"));

        let config = DashboardConfig::from_toml("[limits]\nxlsx_row_ceiling = 1048575\n").unwrap();
        assert_eq!(config.limits.xlsx_row_ceiling, XLSX_MAX_DATA_ROWS);
    }

    #[test]
    fn local_path_overrides_hub() {
        let config =
            DashboardConfig::from_toml("[source]\nlocal_path = \"/tmp/clientes.parquet\"\n").unwrap();
        assert_eq!(
            config.source.local_path,
            Some(PathBuf::from("/tmp/clientes.parquet"))
        );
        assert_eq!(config.source.token_env, "HF_TOKEN");
    }
}
