use actix_web::{delete, dev::Payload, get, post, put, web, FromRequest, HttpRequest, HttpResponse};
use futures::future::{ready, Ready};

use crate::error::LedgerError;
use crate::ledger::{ActivityReassignment, NewActivity, NewExpense, NewTrip, TripLedger};
use crate::membership::{Invitation, PaymentSubmission, RsvpResponse};
use crate::schemas::UserId;
use crate::settlement::NewSettlement;

/// Header carrying the user the gateway authenticated.
pub const USER_HEADER: &str = "X-User-Id";

type Ledger = web::Data<TripLedger>;
type HandlerResult = Result<HttpResponse, LedgerError>;

pub struct ActingUser(pub UserId);

impl FromRequest for ActingUser {
    type Error = LedgerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req
            .headers()
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| ActingUser(value.to_string()));
        ready(user.ok_or(LedgerError::Unauthorized))
    }
}

#[put("/trips/{trip_id}")]
async fn add_trip(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<NewTrip>,
) -> HandlerResult {
    let trip = ledger
        .create_trip(&trip_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(trip))
}

#[post("/trips/{trip_id}/members")]
async fn invite_member(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<Invitation>,
) -> HandlerResult {
    let member = ledger
        .invite_member(&trip_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(member))
}

#[get("/trips/{trip_id}/members")]
async fn list_members(ledger: Ledger, trip_id: web::Path<String>) -> HandlerResult {
    let members = ledger.members(&trip_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(members))
}

#[post("/trips/{trip_id}/rsvp")]
async fn respond_rsvp(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<RsvpResponse>,
) -> HandlerResult {
    let member = ledger
        .respond_rsvp(&trip_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(member))
}

#[post("/trips/{trip_id}/payment")]
async fn submit_payment(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<PaymentSubmission>,
) -> HandlerResult {
    let member = ledger
        .submit_payment(&trip_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(member))
}

#[post("/trips/{trip_id}/members/{user_id}/payment/confirm")]
async fn confirm_member_payment(
    ledger: Ledger,
    path: web::Path<(String, String)>,
    user: ActingUser,
) -> HandlerResult {
    let (trip_id, user_id) = path.into_inner();
    let member = ledger
        .confirm_member_payment(&trip_id, &user.0, &user_id)
        .await?;
    Ok(HttpResponse::Ok().json(member))
}

#[post("/trips/{trip_id}/members/{user_id}/payment/reject")]
async fn reject_member_payment(
    ledger: Ledger,
    path: web::Path<(String, String)>,
    user: ActingUser,
) -> HandlerResult {
    let (trip_id, user_id) = path.into_inner();
    let outcome = ledger
        .reject_member_payment(&trip_id, &user.0, &user_id)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/trips/{trip_id}/members/{user_id}/rejoin")]
async fn allow_rejoin(
    ledger: Ledger,
    path: web::Path<(String, String)>,
    user: ActingUser,
) -> HandlerResult {
    let (trip_id, user_id) = path.into_inner();
    let member = ledger.allow_rejoin(&trip_id, &user.0, &user_id).await?;
    Ok(HttpResponse::Ok().json(member))
}

#[get("/trips/{trip_id}/members/{user_id}/removal")]
async fn removal_eligibility(ledger: Ledger, path: web::Path<(String, String)>) -> HandlerResult {
    let (trip_id, user_id) = path.into_inner();
    let eligibility = ledger.removal_eligibility(&trip_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(eligibility))
}

#[delete("/trips/{trip_id}/members/{user_id}")]
async fn remove_member(
    ledger: Ledger,
    path: web::Path<(String, String)>,
    user: ActingUser,
) -> HandlerResult {
    let (trip_id, user_id) = path.into_inner();
    ledger.remove_member(&trip_id, &user.0, &user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/trips/{trip_id}/expenses")]
async fn add_expense(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    expense: web::Json<NewExpense>,
) -> HandlerResult {
    let expense = ledger
        .add_expense(&trip_id.into_inner(), &user.0, expense.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

#[get("/trips/{trip_id}/expenses")]
async fn list_expenses(ledger: Ledger, trip_id: web::Path<String>) -> HandlerResult {
    let expenses = ledger.expenses(&trip_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(expenses))
}

#[delete("/expenses/{expense_id}")]
async fn delete_expense(ledger: Ledger, expense_id: web::Path<String>, user: ActingUser) -> HandlerResult {
    ledger.delete_expense(&expense_id.into_inner(), &user.0).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/trips/{trip_id}/activities")]
async fn create_activity(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<NewActivity>,
) -> HandlerResult {
    let activity = ledger
        .create_activity(&trip_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(activity))
}

#[get("/trips/{trip_id}/activities")]
async fn list_activities(ledger: Ledger, trip_id: web::Path<String>) -> HandlerResult {
    let activities = ledger.activities(&trip_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(activities))
}

#[delete("/activities/{activity_id}")]
async fn delete_activity(ledger: Ledger, activity_id: web::Path<String>, user: ActingUser) -> HandlerResult {
    ledger.delete_activity(&activity_id.into_inner(), &user.0).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/activities/{activity_id}/reassign")]
async fn reassign_activity(
    ledger: Ledger,
    activity_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<ActivityReassignment>,
) -> HandlerResult {
    let activity = ledger
        .reassign_activity(&activity_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(activity))
}

#[get("/trips/{trip_id}/balances")]
async fn get_balances(ledger: Ledger, trip_id: web::Path<String>) -> HandlerResult {
    let balances = ledger.balances(&trip_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(balances))
}

#[get("/trips/{trip_id}/settlements")]
async fn list_settlements(ledger: Ledger, trip_id: web::Path<String>) -> HandlerResult {
    let settlements = ledger.settlements(&trip_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settlements))
}

#[get("/trips/{trip_id}/settlements/optimized")]
async fn optimized_settlement(ledger: Ledger, trip_id: web::Path<String>) -> HandlerResult {
    let plan = ledger.optimized_settlement(&trip_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(plan))
}

#[get("/trips/{trip_id}/settlements/recommendations/{user_id}")]
async fn user_recommendations(ledger: Ledger, path: web::Path<(String, String)>) -> HandlerResult {
    let (trip_id, user_id) = path.into_inner();
    let transactions = ledger.user_recommendations(&trip_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

#[post("/trips/{trip_id}/settlements")]
async fn initiate_settlement(
    ledger: Ledger,
    trip_id: web::Path<String>,
    user: ActingUser,
    json: web::Json<NewSettlement>,
) -> HandlerResult {
    let settlement = ledger
        .initiate_settlement(&trip_id.into_inner(), &user.0, json.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(settlement))
}

#[post("/settlements/{settlement_id}/confirm")]
async fn confirm_settlement(ledger: Ledger, settlement_id: web::Path<String>, user: ActingUser) -> HandlerResult {
    let settlement = ledger
        .confirm_settlement(&settlement_id.into_inner(), &user.0)
        .await?;
    Ok(HttpResponse::Ok().json(settlement))
}

#[post("/settlements/{settlement_id}/reject")]
async fn reject_settlement(ledger: Ledger, settlement_id: web::Path<String>, user: ActingUser) -> HandlerResult {
    let settlement = ledger
        .reject_settlement(&settlement_id.into_inner(), &user.0)
        .await?;
    Ok(HttpResponse::Ok().json(settlement))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(add_trip)
        .service(list_members)
        .service(invite_member)
        .service(respond_rsvp)
        .service(submit_payment)
        .service(confirm_member_payment)
        .service(reject_member_payment)
        .service(allow_rejoin)
        .service(removal_eligibility)
        .service(remove_member)
        .service(list_expenses)
        .service(add_expense)
        .service(delete_expense)
        .service(list_activities)
        .service(create_activity)
        .service(delete_activity)
        .service(reassign_activity)
        .service(get_balances)
        .service(list_settlements)
        .service(optimized_settlement)
        .service(user_recommendations)
        .service(initiate_settlement)
        .service(confirm_settlement)
        .service(reject_settlement);
}
