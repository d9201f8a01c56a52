#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod state;
mod utils;

#[cfg(test)]
mod test_support;

use dotenvy::dotenv;
use log::info;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::{Build, Request, Response, Rocket};

use crate::guards::GuardFailure;
use crate::utils::{ApiError, ErrorKind};

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

/// The guard's own error when one rejected the request, otherwise a generic one.
fn caught(req: &Request<'_>, kind: ErrorKind, fallback: &str) -> ApiError {
    match &req.local_cache(GuardFailure::default).0 {
        Some(error) => error.clone(),
        None => ApiError::new(kind, fallback),
    }
}

#[catch(400)]
fn bad_request(req: &Request<'_>) -> ApiError {
    caught(req, ErrorKind::Validation, "Malformed request")
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> ApiError {
    caught(req, ErrorKind::Authentication, "Authentication required")
}

#[catch(403)]
fn forbidden(req: &Request<'_>) -> ApiError {
    caught(req, ErrorKind::Authorization, "Access denied")
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> ApiError {
    caught(req, ErrorKind::NotFound, "Resource not found (check /api/v1 prefix)")
}

#[catch(422)]
fn unprocessable(req: &Request<'_>) -> ApiError {
    caught(req, ErrorKind::Validation, "Invalid request body")
}

#[catch(500)]
fn internal_error(req: &Request<'_>) -> ApiError {
    caught(req, ErrorKind::Internal, "Internal server error")
}

#[catch(default)]
fn fallback(status: Status, req: &Request<'_>) -> ApiError {
    caught(
        req,
        ErrorKind::from_status(status),
        status.reason().unwrap_or("Request failed"),
    )
}

/* ----------------------------- ROUTES ----------------------------- */

fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            routes![
                routes::health::health,
                // Auth
                routes::auth::signup,
                routes::auth::login,
                // User
                routes::user::get_profile,
                routes::user::update_profile,
                routes::user::dashboard,
                routes::user::delete_account,
                // Worker
                routes::worker::get_profile,
                routes::worker::get_public_profile,
                routes::worker::update_profile,
                routes::worker::update_location,
                routes::worker::dashboard,
                routes::worker::delete_account,
                // Skills
                routes::skills::list_skills,
                routes::skills::upsert_skill,
                routes::skills::remove_skill,
                routes::skills::set_availability,
                // Requests
                routes::request::create_request,
                routes::request::accept_request,
                routes::request::resolve_request,
                routes::request::request_stats,
                routes::request::delete_request,
                // Reviews
                routes::review::create_review,
                routes::review::get_worker_reviews,
                routes::review::delete_review,
                // Search
                routes::search::search_workers,
                // Uploads
                routes::file_upload::upload_image,
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error,
                fallback
            ],
        )
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    info!("FixItNow API starting");

    mount(rocket::custom(config::figment()).attach(state::init()))
}
