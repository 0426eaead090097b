use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::EngineConfig;
use crate::db::{create_pool, init_database_with_pool, SqliteStore};
use crate::models::*;
use crate::services::{indicator_color, CommunitySignalEngine, SignalRequest, DEFAULT_MOST_WANTED_LIMIT};

pub type AppState = Arc<CommunitySignalEngine<SqliteStore>>;

pub async fn serve(port: u16, config: EngineConfig) -> anyhow::Result<()> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;

    let engine = CommunitySignalEngine::new(Arc::new(SqliteStore::new(pool)), &config);
    let app = create_router().with_state(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("SquadSignal API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/signals", post(community_signal_handler))
        .route("/votes", post(submit_vote_handler).delete(remove_vote_handler))
        .route("/votes/stage", post(stage_vote_handler))
        .route("/votes/{match_id}/{team_id}", get(vote_summary_handler))
        .route("/votes/{match_id}/{team_id}/players/{player_id}", get(player_vote_handler))
        .route("/votes/{match_id}/{team_id}/most-wanted", get(most_wanted_handler))
        .route("/users/{user_id}/votes/{match_id}", get(user_votes_handler))
        .route("/staged-votes/{match_id}", get(staged_votes_handler))
        .route("/staged-votes/{match_id}/flush", post(flush_staged_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("SquadSignal API is running"))
}

// POST /signals - Combined lineup compatibility + replacement suggestions
async fn community_signal_handler(
    State(engine): State<AppState>,
    Json(request): Json<SignalRequest>,
) -> Json<ApiResponse<CommunitySignal>> {
    Json(ApiResponse::success(engine.community_signal(&request).await))
}

// GET /votes/{match_id}/{team_id} - Vote tallies for every voted player
async fn vote_summary_handler(
    State(engine): State<AppState>,
    Path((match_id, team_id)): Path<(MatchId, TeamId)>,
) -> Json<ApiResponse<Vec<VoteSummary>>> {
    Json(ApiResponse::success(engine.match_vote_summary(match_id, team_id).await))
}

#[derive(Debug, Serialize, Deserialize)]
struct PlayerVoteView {
    summary: Option<VoteSummary>,
    indicator: Option<ColorHint>,
}

// GET /votes/{match_id}/{team_id}/players/{player_id} - One player's tally and indicator
async fn player_vote_handler(
    State(engine): State<AppState>,
    Path((match_id, team_id, player_id)): Path<(MatchId, TeamId, PlayerId)>,
) -> Json<ApiResponse<PlayerVoteView>> {
    let summary = engine.player_vote_summary(match_id, team_id, player_id).await;
    let indicator = indicator_color(summary.as_ref());
    Json(ApiResponse::success(PlayerVoteView { summary, indicator }))
}

#[derive(Deserialize)]
struct MostWantedQuery {
    limit: Option<usize>,
}

// GET /votes/{match_id}/{team_id}/most-wanted - Players the crowd wants off
async fn most_wanted_handler(
    State(engine): State<AppState>,
    Path((match_id, team_id)): Path<(MatchId, TeamId)>,
    Query(params): Query<MostWantedQuery>,
) -> Json<ApiResponse<Vec<VoteSummary>>> {
    let limit = params.limit.unwrap_or(DEFAULT_MOST_WANTED_LIMIT).min(25); // Cap at 25
    Json(ApiResponse::success(
        engine.most_wanted_substitutions(match_id, team_id, limit).await,
    ))
}

// GET /users/{user_id}/votes/{match_id} - The caller's own votes
async fn user_votes_handler(
    State(engine): State<AppState>,
    Path((user_id, match_id)): Path<(String, MatchId)>,
) -> Json<ApiResponse<Vec<SubstitutionVote>>> {
    Json(ApiResponse::success(engine.user_votes(match_id, &user_id).await))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    match_id: MatchId,
    team_id: TeamId,
    user_id: String,
    player_id: PlayerId,
    vote_type: VoteType,
    replacement_player_id: Option<PlayerId>,
    #[serde(default)]
    stage_on_failure: bool,
}

impl VoteRequest {
    fn into_vote(self) -> SubstitutionVote {
        SubstitutionVote {
            match_id: self.match_id,
            team_id: self.team_id,
            user_id: self.user_id,
            player_id: self.player_id,
            vote_type: self.vote_type,
            replacement_player_id: self.replacement_player_id,
            updated_at: Utc::now(),
        }
    }
}

// POST /votes - Upsert a substitution vote
async fn submit_vote_handler(
    State(engine): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> Json<ApiResponse<VoteOutcome>> {
    let stage_on_failure = request.stage_on_failure;
    let vote = request.into_vote();
    let outcome = if stage_on_failure {
        engine.submit_or_stage_vote(&vote).await
    } else {
        engine.submit_vote(&vote).await
    };
    Json(ApiResponse::success(outcome))
}

// DELETE /votes - Withdraw a vote by key
async fn remove_vote_handler(
    State(engine): State<AppState>,
    Json(key): Json<VoteKey>,
) -> Json<ApiResponse<VoteOutcome>> {
    Json(ApiResponse::success(engine.remove_vote(&key).await))
}

// POST /votes/stage - Stage a vote locally without touching the store
async fn stage_vote_handler(
    State(engine): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> Json<ApiResponse<VoteOutcome>> {
    Json(ApiResponse::success(engine.stage_vote(request.into_vote())))
}

// GET /staged-votes/{match_id} - Votes waiting to be flushed
async fn staged_votes_handler(
    State(engine): State<AppState>,
    Path(match_id): Path<MatchId>,
) -> Json<ApiResponse<Vec<SubstitutionVote>>> {
    Json(ApiResponse::success(engine.staged_votes(match_id)))
}

// POST /staged-votes/{match_id}/flush - Send staged votes to the store
async fn flush_staged_handler(
    State(engine): State<AppState>,
    Path(match_id): Path<MatchId>,
) -> Json<ApiResponse<FlushReport>> {
    Json(ApiResponse::success(engine.flush_staged_votes(match_id).await))
}
