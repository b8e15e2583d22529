//! Room endpoints and the room WebSocket upgrade

use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use mood_gateway_core::{GatewayError, RoomContentType};
use mood_gateway_rooms::RoomSocket;
use serde::Deserialize;
use validator::Validate;

use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/rooms")
            .route("", web::post().to(create_room))
            .route("/{code}", web::get().to(get_room))
            .route("/{code}/join", web::post().to(join_room))
            .route("/{code}/ws", web::get().to(room_socket)),
    );
}

#[derive(Debug, Deserialize, Validate)]
struct CreateRoomRequest {
    content_type: RoomContentType,
    #[validate(range(min = 2, max = 5))]
    max_participants: i32,
    #[validate(range(min = 1, max = 30))]
    duration_minutes: i32,
    #[validate(length(min = 1, max = 128))]
    creator_session_id: String,
}

async fn create_room(
    state: web::Data<AppState>,
    body: web::Json<CreateRoomRequest>,
) -> Result<HttpResponse, GatewayError> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let room = state
        .rooms
        .create(
            &body.creator_session_id,
            body.content_type,
            body.max_participants,
            body.duration_minutes,
        )
        .await?;
    Ok(HttpResponse::Created().json(room))
}

async fn get_room(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, GatewayError> {
    let snapshot = state.rooms.snapshot(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[derive(Debug, Deserialize, Validate)]
struct JoinRoomRequest {
    #[validate(length(min = 1, max = 128))]
    session_id: String,
}

async fn join_room(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<JoinRoomRequest>,
) -> Result<HttpResponse, GatewayError> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let (room, participants) = state
        .rooms
        .join_or_rejoin(&body.session_id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "room": room,
        "participants_count": participants.len(),
        "ready_count": participants.iter().filter(|p| p.is_ready).count(),
    })))
}

#[derive(Debug, Deserialize)]
struct SocketQuery {
    session_id: String,
}

async fn room_socket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SocketQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let socket = RoomSocket::new(
        path.into_inner(),
        query.into_inner().session_id,
        state.rooms.clone(),
        state.hub.clone(),
    );
    ws::start(socket, &req, stream)
}
