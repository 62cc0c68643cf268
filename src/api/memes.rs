use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::AppState;
use crate::auth::AuthToken;
use crate::error::AppError;

/// Parameters of `GET /memes`. Absent keys are empty strings.
#[derive(Debug, Default, PartialEq)]
pub struct MemeQuery {
    pub lat: String,
    pub lon: String,
    pub query: String,
}

impl MemeQuery {
    /// Build from raw query pairs. When a key repeats, its first value wins;
    /// unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let (mut lat, mut lon, mut query) = (None, None, None);
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "lat" => &mut lat,
                "lon" => &mut lon,
                "query" => &mut query,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        Self {
            lat: lat.unwrap_or_default(),
            lon: lon.unwrap_or_default(),
            query: query.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemeResponse {
    pub meme: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latitude: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub longitude: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub query: String,
}

/// GET /memes
///
/// Costs one credit. The location is echoed back untouched; only `query`
/// influences the generated line.
pub async fn get_meme(
    State(state): State<AppState>,
    Extension(token): Extension<AuthToken>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<MemeResponse>, AppError> {
    let params = MemeQuery::from_pairs(pairs);
    let consumed = state.meter.check_and_consume(token.as_str())?;
    let meme = state.generator.generate(&params.query);

    tracing::info!(
        client_id = consumed.client_id,
        remaining = consumed.remaining,
        "Served meme"
    );

    Ok(Json(MemeResponse {
        meme,
        latitude: params.lat,
        longitude: params.lon,
        query: params.query,
    }))
}
