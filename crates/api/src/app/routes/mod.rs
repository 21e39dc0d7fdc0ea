use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use huachuca_auth::Permission;

use crate::app::AppState;
use crate::authz::{self, Gate};
use crate::middleware;

pub mod auth;
pub mod organizations;
pub mod system;
pub mod well_known;

/// Every route, with its gates.
///
/// Gate order per protected route: organization path parsing, authentication,
/// then the permission/organization gate. `route_layer`s run last-added first.
pub fn router(state: AppState) -> Router<AppState> {
    let authenticate = from_fn_with_state(state.clone(), middleware::authenticate);

    let read_org = Gate::require_all(state.permissions.clone(), [Permission::ReadOrganization])
        .same_organization();
    let invite_user = Gate::require_all(state.permissions.clone(), [Permission::InviteUser])
        .same_organization();
    let create_org = Gate::require_all(state.permissions.clone(), [Permission::CreateOrganization]);

    // Each method carries its own gate; authentication and path parsing wrap both.
    let members = get(organizations::list_users)
        .route_layer(from_fn_with_state(read_org, authz::enforce))
        .merge(
            post(organizations::add_user)
                .route_layer(from_fn_with_state(invite_user, authz::enforce)),
        );

    let organization_routes = Router::new()
        .route(
            "/organizations",
            post(organizations::create_organization)
                .route_layer(from_fn_with_state(create_org, authz::enforce)),
        )
        .route("/organizations/:organization_id/users", members)
        .route_layer(authenticate.clone())
        .route_layer(from_fn(authz::organization_scope));

    let protected = Router::new()
        .route("/whoami", get(system::whoami))
        .route_layer(authenticate);

    Router::new()
        .route("/health", get(system::health))
        .route("/.well-known/jwks.json", get(well_known::jwks))
        .nest("/auth", auth::router())
        .merge(organization_routes)
        .merge(protected)
}
