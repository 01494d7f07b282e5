use crate::config::AppConfig;
use dbadmin_core::catalog::BackupCatalog;
use dbadmin_core::control::cli::CliControl;
use dbadmin_core::control::DatabaseControl;
use dbadmin_core::session::errors::classifier_for;
use dbadmin_core::session::shell::ShellSessionFactory;
use dbadmin_core::session::SessionFactory;
use dbadmin_core::verify::{CommandVerifier, IntegrityVerifier};
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub control: Arc<dyn DatabaseControl>,
    pub sessions: Arc<dyn SessionFactory>,
    pub verifier: Arc<dyn IntegrityVerifier>,
}

impl AppState {
    /// Wires the engine's command line tools from the `[tools]` section.
    pub fn new(config: AppConfig) -> Self {
        let tools = &config.tools;
        let control = Arc::new(CliControl::new(tools));
        let sessions = Arc::new(ShellSessionFactory::new(
            tools.sql_shell.clone(),
            tools.statement_timeout(),
            classifier_for(tools.error_dialect),
        ));
        let verifier = Arc::new(CommandVerifier::new(
            tools.checker_program.clone(),
            tools.verify_timeout(),
        ));
        Self::with_collaborators(config, control, sessions, verifier)
    }

    pub fn with_collaborators(
        config: AppConfig,
        control: Arc<dyn DatabaseControl>,
        sessions: Arc<dyn SessionFactory>,
        verifier: Arc<dyn IntegrityVerifier>,
    ) -> Self {
        Self {
            config,
            control,
            sessions,
            verifier,
        }
    }

    /// The catalog at `location`, or the configured default root.
    pub fn catalog(&self, location: Option<&str>) -> BackupCatalog {
        match location.map(str::trim).filter(|l| !l.is_empty()) {
            Some(location) => BackupCatalog::new(PathBuf::from(location)),
            None => BackupCatalog::new(self.config.server.backups_dir.clone()),
        }
    }
}
