//! Reverse-proxy/domain configuration.

use crate::RuntimeError;
use pressline_schema::EnvKind;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub trait ProxyConfigurator: Send + Sync {
    fn name(&self) -> &str;

    fn create_config(
        &self,
        site_name: &str,
        domain: &str,
        upstream_port: u16,
        kind: EnvKind,
    ) -> Result<(), RuntimeError>;

    fn remove_config(&self, site_name: &str) -> Result<(), RuntimeError>;
}

/// Writes one server block per site into a conf.d-style directory picked
/// up by the proxy's own reload mechanism.
pub struct FileProxyConfigurator {
    conf_dir: PathBuf,
}

impl FileProxyConfigurator {
    pub fn new(conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
        }
    }

    fn conf_path(&self, site_name: &str) -> PathBuf {
        self.conf_dir.join(format!("{site_name}.conf"))
    }
}

impl ProxyConfigurator for FileProxyConfigurator {
    fn name(&self) -> &'static str {
        "file"
    }

    fn create_config(
        &self,
        site_name: &str,
        domain: &str,
        upstream_port: u16,
        kind: EnvKind,
    ) -> Result<(), RuntimeError> {
        debug!("writing proxy config for {domain} -> :{upstream_port}");
        fs::create_dir_all(&self.conf_dir)?;
        let config = format!(
            "# pressline: {site_name} ({kind})\n\
             server {{\n\
             \tlisten 80;\n\
             \tserver_name {domain};\n\
             \tlocation / {{\n\
             \t\tproxy_pass http://127.0.0.1:{upstream_port};\n\
             \t\tproxy_set_header Host $host;\n\
             \t}}\n\
             }}\n"
        );
        fs::write(self.conf_path(site_name), config)?;
        Ok(())
    }

    fn remove_config(&self, site_name: &str) -> Result<(), RuntimeError> {
        let path = self.conf_path(site_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
