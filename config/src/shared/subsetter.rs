use serde::Deserialize;

use crate::shared::{ConnectionConfig, SyncConfig, ValidationError};

/// Complete configuration for the `subsetter` binary.
///
/// This intentionally does not implement [`serde::Serialize`] so that connection secrets are
/// never written back out by accident.
#[derive(Debug, Clone, Deserialize)]
pub struct SubsetterConfig {
    /// Database rows are read from.
    pub source: ConnectionConfig,
    /// Database rows are written to.
    pub destination: ConnectionConfig,
    pub sync: SyncConfig,
}

impl SubsetterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.source.tls.is_valid() {
            return Err(ValidationError::MissingTrustedRootCerts("source"));
        }

        if !self.destination.tls.is_valid() {
            return Err(ValidationError::MissingTrustedRootCerts("destination"));
        }

        if self.source.engine != self.destination.engine {
            return Err(ValidationError::EngineMismatch {
                source_engine: self.source.engine.as_str(),
                destination_engine: self.destination.engine.as_str(),
            });
        }

        self.sync.validate()
    }
}

#[cfg(test)]
mod tests {
    use rust_cli_config::{File, FileFormat};

    use super::*;
    use crate::shared::{DatabaseEngine, SeedTable};

    const CONFIG_YAML: &str = r#"
source:
  engine: mysql
  host: prod.internal
  port: 3306
  name: prod_db
  username: reader
  password: s3cret
destination:
  engine: mysql
  host: localhost
  port: 3306
  name: dev_db
  username: root
sync:
  tables:
    - name: events
      limit: 1000
    - name: Companies
      limit: 1000
  reset_tables: true
"#;

    fn parse(yaml: &str) -> SubsetterConfig {
        rust_cli_config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn parses_yaml_configuration() {
        let config = parse(CONFIG_YAML);

        assert_eq!(config.source.engine, DatabaseEngine::Mysql);
        assert_eq!(config.source.host, "prod.internal");
        assert!(config.destination.password.is_none());
        assert_eq!(
            config.sync.tables,
            vec![SeedTable::new("events", 1000), SeedTable::new("Companies", 1000)]
        );
        assert!(config.sync.reset_tables);
        assert!(config.sync.disable_fk_checks);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_mixed_engines() {
        let mut config = parse(CONFIG_YAML);
        config.destination.engine = DatabaseEngine::Postgres;

        assert_eq!(
            config.validate(),
            Err(ValidationError::EngineMismatch {
                source_engine: "mysql",
                destination_engine: "postgres",
            })
        );
    }

    #[test]
    fn rejects_tls_without_certificates() {
        let mut config = parse(CONFIG_YAML);
        config.destination.tls.enabled = true;

        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingTrustedRootCerts("destination"))
        );
    }
}
