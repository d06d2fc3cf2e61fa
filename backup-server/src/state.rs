use backup_engine::BackupOrchestrator;

pub struct AppState {
    pub orchestrator: BackupOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: BackupOrchestrator) -> Self {
        Self { orchestrator }
    }
}
