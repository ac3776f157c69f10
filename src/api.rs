use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::achievements::{Badge, BadgeInfo};
use crate::database::GroupStore;
use crate::error::{ApiError, ApiResult};
use crate::ledger::HistoryEntry;
use crate::rank::{Progress, RankTier};
use crate::scoreboard::{AwardOutcome, CreateOutcome, DeleteOutcome, EditOutcome, Scoreboard};

pub type AppScoreboard = Scoreboard<Box<dyn GroupStore>>;

pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct RoomQuery {
    pub room: String,
}

#[derive(Deserialize)]
pub struct GroupQuery {
    pub room: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub room: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub room: String,
    pub name: String,
    #[serde(default)]
    pub members: String,
}

#[derive(Deserialize)]
pub struct AwardRequest {
    pub room: String,
    pub groups: Vec<String>,
    pub amount: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Serialize)]
pub struct RankResponse {
    pub xp: i64,
    pub tier: &'static RankTier,
    pub progress: Progress,
}

#[derive(Serialize)]
pub struct BadgeDescription {
    pub id: &'static str,
    #[serde(flatten)]
    pub info: BadgeInfo,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
    room: String,
    name: String,
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Classroom Scoreboard API is running!")
}

async fn list_rooms(board: web::Data<AppScoreboard>) -> HttpResponse {
    HttpResponse::Ok().json(board.rooms())
}

async fn list_groups(
    board: web::Data<AppScoreboard>,
    query: web::Query<RoomQuery>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let RoomQuery { room } = query.into_inner();
    let groups = web::block(move || board.list_groups(&room)).await??;
    Ok(HttpResponse::Ok().json(groups))
}

async fn create_group(
    board: web::Data<AppScoreboard>,
    web::Json(req): web::Json<CreateGroupRequest>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let room = req.room.clone();
    let name = req.name.clone();
    let outcome = web::block(move || board.create_group(&req.room, &req.name, &req.members)).await??;

    match outcome {
        CreateOutcome::Created(record) => Ok(HttpResponse::Created().json(record)),
        CreateOutcome::Duplicate => Err(ApiError::Duplicate(format!("group '{}' in room '{}'", name, room))),
        CreateOutcome::InvalidName => Err(ApiError::Validation("group name must not be empty".to_string())),
        CreateOutcome::UnknownRoom => Err(ApiError::NotFound(format!("room '{}'", room))),
    }
}

async fn delete_group(
    board: web::Data<AppScoreboard>,
    query: web::Query<GroupQuery>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let GroupQuery { room, name } = query.into_inner();
    let (r, n) = (room.clone(), name.clone());
    let outcome = web::block(move || board.delete_group(&r, &n)).await??;

    match outcome {
        DeleteOutcome::Deleted => Ok(HttpResponse::Ok().json(DeleteResponse {
            deleted: true,
            room,
            name,
        })),
        DeleteOutcome::NotFound => Err(ApiError::NotFound(format!("group '{}' in room '{}'", name, room))),
    }
}

async fn edit_history(
    board: web::Data<AppScoreboard>,
    query: web::Query<GroupQuery>,
    web::Json(entries): web::Json<Vec<HistoryEntry>>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let GroupQuery { room, name } = query.into_inner();
    let (r, n) = (room.clone(), name.clone());
    let outcome = web::block(move || board.edit_history(&r, &n, entries)).await??;

    match outcome {
        EditOutcome::Edited(record) => Ok(HttpResponse::Ok().json(record)),
        EditOutcome::NotFound => Err(ApiError::NotFound(format!("group '{}' in room '{}'", name, room))),
        EditOutcome::Rejected(e) => Err(ApiError::Validation(e.to_string())),
    }
}

async fn award(
    board: web::Data<AppScoreboard>,
    web::Json(req): web::Json<AwardRequest>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let outcome = web::block(move || board.award(&req.room, &req.groups, req.amount, &req.reason)).await??;

    match outcome {
        AwardOutcome::Awarded(report) => Ok(HttpResponse::Ok().json(report)),
        AwardOutcome::Rejected(e) => Err(ApiError::Validation(e.to_string())),
    }
}

async fn leaderboard(
    board: web::Data<AppScoreboard>,
    query: web::Query<RoomQuery>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let RoomQuery { room } = query.into_inner();
    let leaderboard = web::block(move || board.leaderboard(&room)).await??;
    Ok(HttpResponse::Ok().json(leaderboard))
}

async fn activity(
    board: web::Data<AppScoreboard>,
    query: web::Query<ActivityQuery>,
) -> ApiResult<HttpResponse> {
    let board = board.into_inner();
    let ActivityQuery { room, limit } = query.into_inner();
    let limit = limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let items = web::block(move || board.activity(&room, limit)).await??;
    Ok(HttpResponse::Ok().json(items))
}

async fn rank(board: web::Data<AppScoreboard>, path: web::Path<i64>) -> HttpResponse {
    let xp = path.into_inner();
    HttpResponse::Ok().json(RankResponse {
        xp,
        tier: board.rank_of(xp),
        progress: board.progress_of(xp),
    })
}

async fn list_badges() -> HttpResponse {
    let catalogue: Vec<BadgeDescription> = Badge::ALL
        .iter()
        .map(|badge| BadgeDescription {
            id: badge.id(),
            info: badge.info(),
        })
        .collect();
    HttpResponse::Ok().json(catalogue)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/rooms", web::get().to(list_rooms))
        .service(
            web::resource("/groups")
                .route(web::get().to(list_groups))
                .route(web::post().to(create_group))
                .route(web::delete().to(delete_group)),
        )
        .route("/groups/history", web::put().to(edit_history))
        .route("/award", web::post().to(award))
        .route("/leaderboard", web::get().to(leaderboard))
        .route("/activity", web::get().to(activity))
        .route("/rank/{xp}", web::get().to(rank))
        .route("/badges", web::get().to(list_badges));
}
