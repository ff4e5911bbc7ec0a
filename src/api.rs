use crate::error::StoreError;
use crate::model::{Occupancy, Stars};
use crate::views::Session;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

#[derive(Debug, Default, Deserialize)]
struct StopPair {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

#[derive(Debug, Deserialize)]
struct OccupancyBody {
    occupancy: Occupancy,
}

#[derive(Debug, Deserialize)]
struct RatingBody {
    stars: u8,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: message.into(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn store_error(e: &StoreError) -> Response {
    let status = match e {
        StoreError::BusNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidRating(_) => StatusCode::BAD_REQUEST,
    };
    error_reply(status, e.to_string())
}

fn respond<T: Serialize>(result: Result<T, StoreError>) -> Result<Response, Infallible> {
    Ok(match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => store_error(&e),
    })
}

fn empty_query() -> Response {
    error_reply(
        StatusCode::BAD_REQUEST,
        "Both start and end stops are required",
    )
}

/// Every view and mutation of a session, as JSON over HTTP.
pub fn routes(session: Arc<Session>) -> BoxedFilter<(impl Reply,)> {
    let session_filter = warp::any().map(move || session.clone()).boxed();

    // GET /
    let landing_route = warp::path::end()
        .and(warp::get())
        .and(session_filter.clone())
        .map(|s: Arc<Session>| warp::reply::json(&s.landing()));

    // GET /stops
    let stops_route = warp::path!("stops")
        .and(warp::get())
        .and(session_filter.clone())
        .map(|s: Arc<Session>| warp::reply::json(&s.store().list_stops()));

    // GET /buses
    let buses_route = warp::path!("buses")
        .and(warp::get())
        .and(session_filter.clone())
        .map(|s: Arc<Session>| warp::reply::json(&s.store().list_buses()));

    // GET /buses/{id}
    let bus_route = warp::path!("buses" / String)
        .and(warp::get())
        .and(session_filter.clone())
        .and_then(|id: String, s: Arc<Session>| async move { respond(s.bus_detail(&id)) });

    // POST /buses/{id}/watch
    let watch_route = warp::path!("buses" / String / "watch")
        .and(warp::post())
        .and(session_filter.clone())
        .and_then(|id: String, s: Arc<Session>| async move {
            respond(s.watch_bus(&id).map(|watchers| json!({ "watchers": watchers })))
        });

    // DELETE /buses/{id}/watch
    let unwatch_route = warp::path!("buses" / String / "watch")
        .and(warp::delete())
        .and(session_filter.clone())
        .and_then(|id: String, s: Arc<Session>| async move {
            let result = s.unwatch_bus(&id).await;
            respond(result.map(|watchers| json!({ "watchers": watchers })))
        });

    // POST /buses/{id}/occupancy
    let occupancy_route = warp::path!("buses" / String / "occupancy")
        .and(warp::post())
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(|id: String, body: OccupancyBody, s: Arc<Session>| async move {
            respond(s.store().set_occupancy(&id, body.occupancy))
        });

    // POST /buses/{id}/rating
    let rating_route = warp::path!("buses" / String / "rating")
        .and(warp::post())
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(|id: String, body: RatingBody, s: Arc<Session>| async move {
            let result = Stars::try_from(body.stars)
                .and_then(|stars| s.store().submit_rating(&id, stars))
                .map(|stars| json!({ "stars": stars }));
            respond(result)
        });

    // POST /buses/{id}/favorite
    let favorite_route = warp::path!("buses" / String / "favorite")
        .and(warp::post())
        .and(session_filter.clone())
        .and_then(|id: String, s: Arc<Session>| async move {
            respond(
                s.store()
                    .toggle_favorite(&id)
                    .map(|favorite| json!({ "favorite": favorite })),
            )
        });

    // GET /routes?start=&end=
    let search_route = warp::path!("routes")
        .and(warp::get())
        .and(warp::query::<StopPair>())
        .and(session_filter.clone())
        .map(|q: StopPair, s: Arc<Session>| {
            match s.store().find_routes(&q.start, &q.end) {
                Some(found) => warp::reply::json(&found).into_response(),
                None => empty_query(),
            }
        });

    // GET /driver
    let driver_route = warp::path!("driver")
        .and(warp::get())
        .and(session_filter.clone())
        .and_then(|s: Arc<Session>| async move { respond(s.driver_console().await) });

    // POST /driver/sharing
    let sharing_route = warp::path!("driver" / "sharing")
        .and(warp::post())
        .and(session_filter.clone())
        .and_then(|s: Arc<Session>| async move {
            let result = s.toggle_sharing().await;
            respond(result.map(|sharing| json!({ "sharing": sharing })))
        });

    // POST /driver/occupancy
    let driver_occupancy_route = warp::path!("driver" / "occupancy")
        .and(warp::post())
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(|body: OccupancyBody, s: Arc<Session>| async move {
            respond(s.set_driver_occupancy(body.occupancy))
        });

    // GET /passenger
    let passenger_route = warp::path!("passenger")
        .and(warp::get())
        .and(session_filter.clone())
        .then(|s: Arc<Session>| async move { warp::reply::json(&s.passenger_console().await) });

    // POST /passenger/search?start=&end=
    let passenger_search_route = warp::path!("passenger" / "search")
        .and(warp::post())
        .and(warp::query::<StopPair>())
        .and(session_filter)
        .then(|q: StopPair, s: Arc<Session>| async move {
            match s.search(&q.start, &q.end).await {
                Some(found) => warp::reply::json(&found).into_response(),
                None => empty_query(),
            }
        });

    landing_route
        .or(stops_route)
        .or(buses_route)
        .or(bus_route)
        .or(watch_route)
        .or(unwatch_route)
        .or(occupancy_route)
        .or(rating_route)
        .or(favorite_route)
        .or(search_route)
        .or(driver_route)
        .or(sharing_route)
        .or(driver_occupancy_route)
        .or(passenger_route)
        .or(passenger_search_route)
        .recover(handle_rejection)
        .with(warp::log::custom(|info| {
            debug!(
                method = %info.method(),
                path = info.path(),
                status = info.status().as_u16(),
                "Request"
            );
        }))
        .boxed()
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let reply = if err.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "Not found")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        error_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        warn!("Unhandled rejection: {:?}", err);
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FeedSettings;
    use crate::seed::Fleet;
    use crate::state::FleetStore;
    use serde_json::Value;

    fn api() -> (Arc<Session>, BoxedFilter<(impl Reply,)>) {
        let store = Arc::new(FleetStore::new(Fleet::seeded().unwrap()));
        let session = Arc::new(Session::new(store, FeedSettings::default()).unwrap());
        (session.clone(), routes(session))
    }

    fn body<B: AsRef<[u8]>>(res: &warp::http::Response<B>) -> Value {
        serde_json::from_slice(res.body().as_ref()).unwrap()
    }

    #[tokio::test]
    async fn unhandled_rejection_hides_details() {
        let res = handle_rejection(warp::reject::custom(Unexpected))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = warp::hyper::body::to_bytes(res.into_body()).await.unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"], "Internal server error");
    }

    #[derive(Debug)]
    struct Unexpected;
    impl warp::reject::Reject for Unexpected {}

    #[tokio::test]
    async fn lists_stops_and_buses() {
        let (_, api) = api();
        let res = warp::test::request().path("/stops").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        let stops: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(stops.as_array().map(Vec::len), Some(8));

        let res = warp::test::request().path("/buses").reply(&api).await;
        let buses: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(buses[0]["id"], "bus-1");
        assert_eq!(buses[2]["occupancy"], "High");
    }

    #[tokio::test]
    async fn unknown_bus_is_404() {
        let (_, api) = api();
        let res = warp::test::request().path("/buses/bus-42").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let v: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(v["error"], "Bus not found: bus-42");
    }

    #[tokio::test]
    async fn route_search_reports_kind() {
        let (_, api) = api();
        let res = warp::test::request()
            .path("/routes?start=1&end=6")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let v: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(v["kind"], "suggested");
        assert_eq!(v["buses"][1]["id"], "bus-2");
    }

    #[tokio::test]
    async fn empty_route_query_is_400() {
        let (_, api) = api();
        let res = warp::test::request()
            .path("/routes?start=1")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn zero_star_rating_is_rejected() {
        let (session, api) = api();
        let res = warp::test::request()
            .method("POST")
            .path("/buses/bus-1/rating")
            .json(&json!({ "stars": 0 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(session.store().rating_for("bus-1"), None);

        let res = warp::test::request()
            .method("POST")
            .path("/buses/bus-1/rating")
            .json(&json!({ "stars": 4 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["stars"], 4);
        let detail = warp::test::request().path("/buses/bus-1").reply(&api).await;
        assert_eq!(body(&detail)["my_rating"], 4);
    }

    #[tokio::test]
    async fn favorite_toggle_round_trips() {
        let (_, api) = api();
        let toggle = || {
            warp::test::request()
                .method("POST")
                .path("/buses/bus-1/favorite")
        };
        assert_eq!(body(&toggle().reply(&api).await)["favorite"], false);
        assert_eq!(body(&toggle().reply(&api).await)["favorite"], true);
    }

    #[tokio::test]
    async fn occupancy_body_is_validated() {
        let (session, api) = api();
        let res = warp::test::request()
            .method("POST")
            .path("/driver/occupancy")
            .json(&json!({ "occupancy": "Packed" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = warp::test::request()
            .method("POST")
            .path("/buses/bus-3/occupancy")
            .json(&json!({ "occupancy": "Low" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            session.store().get_bus("bus-3").unwrap().occupancy,
            Occupancy::Low
        );
    }

    #[tokio::test]
    async fn watch_and_sharing_start_feeds() {
        let (session, api) = api();
        let res = warp::test::request()
            .method("POST")
            .path("/buses/bus-2/watch")
            .reply(&api)
            .await;
        assert_eq!(body(&res)["watchers"], 1);

        let res = warp::test::request()
            .method("POST")
            .path("/driver/sharing")
            .reply(&api)
            .await;
        assert_eq!(body(&res)["sharing"], true);
        assert_eq!(session.feeds().active_count(), 2);

        let res = warp::test::request()
            .method("DELETE")
            .path("/buses/bus-2/watch")
            .reply(&api)
            .await;
        assert_eq!(body(&res)["watchers"], 0);
        session.close().await;
        assert_eq!(session.feeds().active_count(), 0);
    }

    #[tokio::test]
    async fn passenger_search_fills_console() {
        let (session, api) = api();
        let res = warp::test::request()
            .method("POST")
            .path("/passenger/search?start=1&end=3")
            .reply(&api)
            .await;
        assert_eq!(body(&res)["kind"], "direct");

        let res = warp::test::request().path("/passenger").reply(&api).await;
        let v = body(&res);
        assert_eq!(v["results"][0]["id"], "bus-1");
        assert_eq!(v["history"].as_array().map(Vec::len), Some(3));
        assert_eq!(v["impact"]["rides_this_month"], 12);
        session.close().await;
    }
}
