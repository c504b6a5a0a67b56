use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::api::origin::{ClientOrigin, FORWARDED_FOR_HEADER};

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID. Wraps around to zero on overflow.
    pub fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A rocket fairing that logs every request and response, tagged with a
/// per-request ID so the two can be matched up.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let protocol = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let ip = &rocket.config().address;
        let port = &rocket.config().port;
        info!("Polls server launched on {protocol}://{ip}:{port}");
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = req.local_cache(RequestId::next);
        let origin = ClientOrigin::derive(
            req.headers().get_one(FORWARDED_FOR_HEADER),
            req.remote().map(|addr| addr.ip()),
        );
        info!("->req{id} {} {} from {origin}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = req.local_cache(RequestId::next);
        let code = res.status();
        let route = match req.route() {
            Some(route) => match route.name {
                Some(ref name) => format!("{name} ({})", route.uri),
                None => route.uri.to_string(),
            },
            None => "UNKNOWN ROUTE".to_string(),
        };
        let log_msg = format!("<-rsp{id} {code} {route}");
        match code.class() {
            StatusClass::ServerError => error!("{log_msg}"),
            StatusClass::ClientError => warn!("{log_msg}"),
            _ => info!("{log_msg}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, stopping gracefully...");
    }
}
