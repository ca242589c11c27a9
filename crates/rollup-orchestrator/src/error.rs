//! Error taxonomy for a single per-config rollup attempt. Every variant
//! carries enough detail to write a faithful `ErrorLog` row; kinds that are
//! locally recoverable are handled by the caller rather than bubbled up.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    #[error("transient store error: {0}")]
    TransientStore(#[from] sqlx::Error),

    #[error("plan degenerate for {source} -> {target}: no dimensions and no aggregated columns")]
    PlanDegenerate { source: String, target: String },

    #[error("execution budget exceeded for config {config_id}")]
    BudgetExceeded { config_id: Uuid },

    #[error("lease lost for config {config_id}: another worker took over mid-run")]
    LeaseLost { config_id: Uuid },
}

/// Diagnostic fields extracted from a failure, shaped for `ErrorLog`.
#[derive(Debug, Clone, Default)]
pub struct ErrorDiagnostics {
    pub message: String,
    pub sql_state: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub context: Option<String>,
    pub attempted_query: Option<String>,
}

impl RollupError {
    /// Render this error into the fields `ErrorLog` expects. `context`
    /// names the step that failed (e.g. "plan execution", "budget check");
    /// `attempted_query` is filled in by the caller when the failure
    /// happened while executing a rendered statement.
    pub fn diagnostics(&self, context: &str, attempted_query: Option<&str>) -> ErrorDiagnostics {
        match self {
            RollupError::TransientStore(err) => {
                let (sql_state, detail, hint) = postgres_fields(err);
                ErrorDiagnostics {
                    message: err.to_string(),
                    sql_state,
                    detail,
                    hint,
                    context: Some(context.to_string()),
                    attempted_query: attempted_query.map(str::to_string),
                }
            }
            other => ErrorDiagnostics {
                message: other.to_string(),
                sql_state: None,
                detail: None,
                hint: None,
                context: Some(context.to_string()),
                attempted_query: attempted_query.map(str::to_string),
            },
        }
    }
}

fn postgres_fields(err: &sqlx::Error) -> (Option<String>, Option<String>, Option<String>) {
    let Some(db_err) = err.as_database_error() else {
        return (None, None, None);
    };
    let sql_state = db_err.code().map(|c| c.to_string());
    match db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        Some(pg) => (
            sql_state,
            pg.detail().map(str::to_string),
            pg.hint().map(str::to_string),
        ),
        None => (sql_state, None, None),
    }
}
