use crate::kv;
use crate::layout::StoreLayout;
use crate::StoreError;
use pressline_schema::{EnvKind, Environment};
use std::fs;

/// Checksummed JSON store of [`Environment`] records, one file per
/// environment id.
#[derive(Debug, Clone)]
pub struct EnvironmentStore {
    layout: StoreLayout,
}

impl EnvironmentStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn put(&self, env: &Environment) -> Result<(), StoreError> {
        env.validate()?;
        let dir = self.layout.environments_dir();
        let dest = dir.join(env.env_id.as_str());
        kv::write_record(&dir, &dest, env)
    }

    pub fn get(&self, env_id: &str) -> Result<Environment, StoreError> {
        let path = self.layout.environments_dir().join(env_id);
        if !path.exists() {
            return Err(StoreError::EnvNotFound(env_id.to_owned()));
        }
        kv::read_record(&path, env_id)
    }

    pub fn exists(&self, env_id: &str) -> bool {
        self.layout.environments_dir().join(env_id).exists()
    }

    pub fn remove(&self, env_id: &str) -> Result<(), StoreError> {
        let path = self.layout.environments_dir().join(env_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Environment>, StoreError> {
        let mut results = Vec::new();
        for id in kv::list_ids(&self.layout.environments_dir())? {
            match self.get(&id) {
                Ok(env) => results.push(env),
                Err(e) => {
                    tracing::warn!("skipping corrupted environment record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    /// All non-production environments derived from one production env.
    pub fn list_children(&self, production_id: &str) -> Result<Vec<Environment>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|e| e.production.as_deref() == Some(production_id))
            .collect())
    }

    pub fn get_by_name(&self, name: &str) -> Result<Environment, StoreError> {
        self.list()?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StoreError::EnvNotFound(format!("name '{name}'")))
    }

    /// Singleton check: does `production_id` already have a child of this
    /// kind? Multidevs are exempt.
    pub fn kind_exists(&self, production_id: &str, kind: EnvKind) -> Result<bool, StoreError> {
        Ok(self
            .list_children(production_id)?
            .iter()
            .any(|e| e.kind == kind))
    }

    /// Read-modify-write with a fresh `updated_at`.
    pub fn update<F>(&self, env_id: &str, mutate: F) -> Result<Environment, StoreError>
    where
        F: FnOnce(&mut Environment),
    {
        let mut env = self.get(env_id)?;
        mutate(&mut env);
        env.updated_at = chrono::Utc::now().to_rfc3339();
        self.put(&env)?;
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_schema::{DbDescriptor, EnvId, EnvStatus, SourceDescriptor};

    fn test_store() -> (tempfile::TempDir, EnvironmentStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, EnvironmentStore::new(layout))
    }

    fn sample_env(id: &str, kind: EnvKind, production: Option<&str>) -> Environment {
        Environment {
            env_id: EnvId::new(id),
            name: id.to_owned(),
            kind,
            production: production.map(EnvId::new),
            domain: format!("{id}.sites.local"),
            database: DbDescriptor {
                host: "127.0.0.1".to_owned(),
                port: 3306,
                name: id.replace('-', "_"),
                user: id.replace('-', "_"),
                password_ref: "secret".to_owned(),
                table_prefix: "wp_".to_owned(),
            },
            stack: None,
            lock: None,
            source: SourceDescriptor {
                repo_url: "https://git.example/site.git".to_owned(),
                branch: "main".to_owned(),
                deployed_revision: None,
                deployed_at: None,
            },
            file_root: format!("/srv/{id}"),
            status: EnvStatus::Running,
            app_version: None,
            runtime_version: None,
            multisite: false,
            created_at: "2026-01-01T00:00:00Z".to_owned(),
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
            checksum: None,
        }
    }

    #[test]
    fn roundtrip_embeds_checksum() {
        let (_dir, store) = test_store();
        let env = sample_env("site-prod", EnvKind::Production, None);
        store.put(&env).unwrap();
        let back = store.get("site-prod").unwrap();
        assert_eq!(back.env_id, env.env_id);
        assert!(back.checksum.is_some(), "put() must embed a checksum");
    }

    #[test]
    fn put_rejects_invariant_violations() {
        let (_dir, store) = test_store();
        let env = sample_env("rogue-dev", EnvKind::Development, None);
        assert!(store.put(&env).is_err());
        assert!(!store.exists("rogue-dev"));
    }

    #[test]
    fn list_children_filters_by_production() {
        let (_dir, store) = test_store();
        store
            .put(&sample_env("site-prod", EnvKind::Production, None))
            .unwrap();
        store
            .put(&sample_env("site-dev", EnvKind::Development, Some("site-prod")))
            .unwrap();
        store
            .put(&sample_env("other-prod", EnvKind::Production, None))
            .unwrap();

        let children = store.list_children("site-prod").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].env_id.as_str(), "site-dev");
    }

    #[test]
    fn kind_exists_ignores_other_productions() {
        let (_dir, store) = test_store();
        store
            .put(&sample_env("site-dev", EnvKind::Development, Some("site-prod")))
            .unwrap();
        assert!(store.kind_exists("site-prod", EnvKind::Development).unwrap());
        assert!(!store.kind_exists("site-prod", EnvKind::Staging).unwrap());
        assert!(!store
            .kind_exists("other-prod", EnvKind::Development)
            .unwrap());
    }

    #[test]
    fn update_bumps_timestamp() {
        let (_dir, store) = test_store();
        store
            .put(&sample_env("site-prod", EnvKind::Production, None))
            .unwrap();
        let updated = store
            .update("site-prod", |e| e.status = EnvStatus::Failed)
            .unwrap();
        assert_eq!(updated.status, EnvStatus::Failed);
        assert_ne!(updated.updated_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn get_by_name_works() {
        let (_dir, store) = test_store();
        store
            .put(&sample_env("site-prod", EnvKind::Production, None))
            .unwrap();
        assert_eq!(
            store.get_by_name("site-prod").unwrap().env_id.as_str(),
            "site-prod"
        );
        assert!(store.get_by_name("missing").is_err());
    }

    #[test]
    fn list_skips_corrupt_records() {
        let (_dir, store) = test_store();
        store
            .put(&sample_env("site-prod", EnvKind::Production, None))
            .unwrap();
        fs::write(
            store.layout.environments_dir().join("corrupt"),
            "NOT VALID JSON",
        )
        .unwrap();
        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = test_store();
        store
            .put(&sample_env("site-prod", EnvKind::Production, None))
            .unwrap();
        store.remove("site-prod").unwrap();
        store.remove("site-prod").unwrap();
        assert!(!store.exists("site-prod"));
    }
}
