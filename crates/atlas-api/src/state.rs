use atlas_infra::ServerService;
use sqlx::PgPool;

use crate::audit::AuditLogger;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub servers: ServerService,
    pub audit: AuditLogger,
}
