//! HTTP route registration

pub mod content;
pub mod recommendations;
pub mod rooms;
pub mod user;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    // user routes own the exact /content/rate path and must register
    // before the /content scope
    user::configure(cfg);
    content::configure(cfg);
    recommendations::configure(cfg);
    rooms::configure(cfg);
}
