// Read-only counters and room listing.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use agrelay_sfu::RegistryStats;

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    details: Option<String>,
}

impl StatsQuery {
    fn details_requested(&self) -> bool {
        self.details.as_deref() == Some("true")
    }
}

/// `GET /get.stats[?details=true]`
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<RegistryStats> {
    Json(state.registry.stats(query.details_requested()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_flag_only_accepts_literal_true() {
        let on = StatsQuery {
            details: Some("true".to_string()),
        };
        assert!(on.details_requested());

        let off = StatsQuery {
            details: Some("1".to_string()),
        };
        assert!(!off.details_requested());
        assert!(!StatsQuery::default().details_requested());
    }
}
