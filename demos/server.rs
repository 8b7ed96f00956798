//! Minimal Actix Web service demonstrating per-route permission guards.
//!
//! Routes mirror a small casting-agency API: movies and actors, each
//! guarded by a `<verb>:<resource>` permission literal. Storage is an
//! in-memory list; the interesting part is the authorization wiring.
//!
//! Configure the issuer via environment variables, e.g.:
//!
//! ```sh
//! AUTH_ISSUER=https://your-tenant.example.com \
//! AUTH_AUDIENCE=castings-api \
//! cargo run --example server
//! ```

use std::sync::Mutex;

use actix_scope_auth::{AuthConfig, AuthenticatedContext, RequireScope, TokenAuthority};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Serialize, Deserialize)]
struct Movie {
    title: String,
    release_date: String,
}

#[derive(Clone, Serialize, Deserialize)]
struct Actor {
    name: String,
    age: u32,
}

#[derive(Default)]
struct Catalog {
    movies: Mutex<Vec<Movie>>,
    actors: Mutex<Vec<Actor>>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid auth configuration: {e}");
            std::process::exit(1);
        }
    };

    let authority = match TokenAuthority::new(config) {
        Ok(authority) => authority,
        Err(e) => {
            eprintln!("Failed to build token authority: {e}");
            std::process::exit(1);
        }
    };

    // Fail startup loudly if the key source is unreachable.
    if let Err(e) = authority.warm_up().await {
        eprintln!("Failed to fetch issuer signing keys: {e}");
        std::process::exit(1);
    }

    let catalog = web::Data::new(Catalog::default());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(authority.clone()))
            .app_data(catalog.clone())
            .service(
                web::resource("/movies")
                    .route(
                        web::get().to(list_movies).wrap(RequireScope::new("get:movies")),
                    )
                    .route(
                        web::post().to(create_movie).wrap(RequireScope::new("post:movies")),
                    ),
            )
            .service(
                web::resource("/actors")
                    .route(
                        web::get().to(list_actors).wrap(RequireScope::new("get:actors")),
                    )
                    .route(
                        web::post().to(create_actor).wrap(RequireScope::new("post:actors")),
                    ),
            )
            .service(
                web::resource("/movies/{index}").route(
                    web::delete().to(delete_movie).wrap(RequireScope::new("delete:movies")),
                ),
            )
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}

async fn list_movies(catalog: web::Data<Catalog>) -> impl Responder {
    let movies = catalog.movies.lock().unwrap().clone();
    HttpResponse::Ok().json(json!({ "success": true, "movies": movies }))
}

async fn create_movie(
    catalog: web::Data<Catalog>,
    movie: web::Json<Movie>,
    context: AuthenticatedContext,
) -> impl Responder {
    let mut movies = catalog.movies.lock().unwrap();
    movies.push(movie.into_inner());
    HttpResponse::Created().json(json!({
        "success": true,
        "total_movies": movies.len(),
        "created_by": context.subject,
    }))
}

async fn delete_movie(catalog: web::Data<Catalog>, index: web::Path<usize>) -> impl Responder {
    let mut movies = catalog.movies.lock().unwrap();
    let index = index.into_inner();
    if index >= movies.len() {
        return HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "resource not found",
        }));
    }
    movies.remove(index);
    HttpResponse::Ok().json(json!({ "success": true, "deleted": index }))
}

async fn list_actors(catalog: web::Data<Catalog>) -> impl Responder {
    let actors = catalog.actors.lock().unwrap().clone();
    HttpResponse::Ok().json(json!({ "success": true, "actors": actors }))
}

async fn create_actor(
    catalog: web::Data<Catalog>,
    actor: web::Json<Actor>,
    context: AuthenticatedContext,
) -> impl Responder {
    let mut actors = catalog.actors.lock().unwrap();
    actors.push(actor.into_inner());
    HttpResponse::Created().json(json!({
        "success": true,
        "total_actors": actors.len(),
        "created_by": context.subject,
    }))
}
