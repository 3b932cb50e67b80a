/*!
 * Routes Module
 * API route handlers and the router for each resource family.
 */

pub mod auth;
pub mod brochure;
pub mod form;
pub mod health;
pub mod resource;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::require_auth;
use crate::models::{BlogPost, GalleryItem, Product, Resource};
use crate::state::AppState;

/// Public reads plus authenticated writes for one resource type at `base`.
pub fn resource_router<T: Resource>(base: &str, state: &AppState) -> Router<AppState> {
    let item = format!("{}/{{id}}", base);

    let public = Router::new()
        .route(base, get(resource::list::<T>))
        .route(&item, get(resource::get_one::<T>));

    let admin = Router::new()
        .route(base, post(resource::create::<T>))
        .route(
            &item,
            axum::routing::put(resource::update::<T>).delete(resource::remove::<T>),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(admin)
}

/// Every `/api` and `/health` route.
pub fn api_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(resource_router::<Product>("/api/products", state))
        .merge(resource_router::<GalleryItem>("/api/gallery", state))
        .merge(resource_router::<BlogPost>("/api/blog", state))
        .merge(auth::router())
        .merge(brochure::router(state))
        .merge(health::router())
}
