//! # Composition Root
//!
//! Wires every service onto one store, clock, notifier and cipher.

use std::sync::Arc;

use thiserror::Error;

use crate::audit::FileAuditSink;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError, PolicyConfig};
use crate::crypto::{CryptoError, EncryptionService};
use crate::delivery::MessageDelivery;
use crate::notify::{create_notifier, Notifier, NotifyError};
use crate::scheduler::Scheduler;
use crate::store::{MemoryStore, RecordStore, StoreError};
use crate::switch::{StateMachine, SwitchLifecycleManager};
use crate::verification::{VerificationQuorumEngine, VerifierRegistry};

pub type AppResult<T> = Result<T, AppError>;

/// Startup failures
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Failed to open audit log: {0}")]
    Audit(String),
}

/// Every service of one deployment.
pub struct DeadSwitch<S: RecordStore> {
    pub store: Arc<S>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub machine: StateMachine<S>,
    pub switches: SwitchLifecycleManager<S>,
    pub verifiers: VerifierRegistry<S>,
    pub verification: VerificationQuorumEngine<S>,
    pub delivery: MessageDelivery<S>,
    pub scheduler: Scheduler<S>,
}

impl<S: RecordStore> Clone for DeadSwitch<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            machine: self.machine.clone(),
            switches: self.switches.clone(),
            verifiers: self.verifiers.clone(),
            verification: self.verification.clone(),
            delivery: self.delivery.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S: RecordStore> DeadSwitch<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        cipher: Arc<EncryptionService>,
        policy: &PolicyConfig,
    ) -> Self {
        let machine = StateMachine::new(store.clone(), clock.clone());
        let switches = SwitchLifecycleManager::new(store.clone(), clock.clone(), cipher.clone());
        let verifiers = VerifierRegistry::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            policy.verification(),
        );
        let verification = VerificationQuorumEngine::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            policy.verification(),
        );
        let delivery = MessageDelivery::new(
            store.clone(),
            clock.clone(),
            cipher,
            notifier.clone(),
            policy.delivery_claim_ttl(),
        );
        let scheduler = Scheduler::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            verification.clone(),
            delivery.clone(),
            policy.scheduler(),
        );

        Self {
            store,
            clock,
            notifier,
            machine,
            switches,
            verifiers,
            verification,
            delivery,
            scheduler,
        }
    }
}

impl DeadSwitch<MemoryStore> {
    /// Open the snapshot and audit log named by `config`.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let audit_path = config.audit_log_path();
        let audit = FileAuditSink::open(&audit_path)
            .map_err(|e| AppError::Audit(format!("{}: {}", audit_path.display(), e)))?;
        let store = MemoryStore::open(&config.data_path, Arc::new(audit))?;
        let cipher = EncryptionService::new(&config.master_key)?;
        let notifier = create_notifier(config.email.clone(), &config.http.base_url)?;

        tracing::info!(
            data_path = %config.data_path.display(),
            audit_log = %audit_path.display(),
            "record store opened"
        );
        Ok(Self::new(
            Arc::new(store),
            Arc::new(SystemClock),
            notifier,
            Arc::new(cipher),
            &config.policy,
        ))
    }

    /// Write the snapshot back to `config.data_path`.
    pub fn persist(&self, config: &Config) -> AppResult<()> {
        self.store.save(&config.data_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Actor, Role};
    use crate::switch::SwitchSettings;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::generate(dir.join("store.json"));
        config.http.base_url = "https://switch.example.com".into();
        config
    }

    #[test]
    fn test_from_config_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let app = DeadSwitch::from_config(&config).unwrap();
        let user = app
            .switches
            .register_user("owner@example.com", "Owner", Role::Owner)
            .unwrap();
        let switch = app
            .switches
            .create(&Actor::owner(user.id), SwitchSettings::default())
            .unwrap();
        app.persist(&config).unwrap();
        assert!(config.audit_log_path().exists());

        let reopened = DeadSwitch::from_config(&config).unwrap();
        let loaded = reopened
            .switches
            .get(&Actor::owner(user.id), switch.id)
            .unwrap();
        assert_eq!(loaded, switch);
    }

    #[test]
    fn test_bad_master_key_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.master_key = "short".into();
        assert!(matches!(
            DeadSwitch::from_config(&config),
            Err(AppError::Crypto(_))
        ));
    }
}
