use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    get_current_user, health_check, list_sessions, login, logout, refresh, register, revoke_all,
};
use crate::security::RateLimiter;

pub fn run(
    listener: TcpListener,
    auth_service: Arc<AuthService>,
    rate_limiter: Arc<RateLimiter>,
) -> Result<Server, std::io::Error> {
    let auth_data = web::Data::from(auth_service.clone());
    let limiter_data = web::Data::from(rate_limiter);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            // Shared state
            .app_data(auth_data.clone())
            .app_data(limiter_data.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .route("/me", web::get().to(get_current_user))
                    .route("/revoke-all", web::post().to(revoke_all)),
            )
            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(auth_service.clone()))
                    .route("/sessions", web::get().to(list_sessions)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
