use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    route::{
        auth::{login, logout, me, signup},
        booking::{cancel_booking, create_booking, get_booking_by_id, get_bookings, update_booking},
        customer::{create_customer, delete_customer, get_customer_by_id, get_customers, update_customer},
        health::health,
        payment::{create_payment_intent, get_payments, stripe_webhook},
        quote::{create_quote, delete_quote, get_quote_by_id, get_quotes, send_quote, update_quote},
        subscription::get_plans,
    },
    state::AppState,
    utils::ratelimit::limit_api,
};

fn api_routes() -> Router<AppState> {
    Router::new()
    //auth
    .route("/auth/signup", post(signup))
    .route("/auth/login", post(login))
    .route("/auth/me", get(me))
    .route("/auth/logout", post(logout))
    //subscriptions
    .route("/subscriptions/plans", get(get_plans))
    //customers
    .route("/customers", get(get_customers).post(create_customer))
    .route("/customers/{id}", get(get_customer_by_id).patch(update_customer).delete(delete_customer))
    //bookings
    .route("/bookings", get(get_bookings).post(create_booking))
    .route("/bookings/{id}", get(get_booking_by_id).patch(update_booking).delete(cancel_booking))
    //quotes
    .route("/quotes", get(get_quotes).post(create_quote))
    .route("/quotes/{id}", get(get_quote_by_id).patch(update_quote).delete(delete_quote))
    .route("/quotes/{id}/send", post(send_quote))
    //payments
    .route("/payments", get(get_payments))
    .route("/payments/create-intent", post(create_payment_intent))
    .route("/payments/webhook", post(stripe_webhook))    //signed by Stripe, no bearer token
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
    .route("/health", get(health))
    .nest(
        "/api",
        api_routes().layer(middleware::from_fn_with_state(state.clone(), limit_api)),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
