use super::{Trigger, TriggerError};
use crate::context::Context;
use log::{debug, info};
use std::{collections::HashMap, sync::mpsc::Sender};
use tiny_http::{Response, Server};

const TRIGGER_NAME: &str = "HTTP";

/// A trigger that runs on an HTTP request.
///
/// This could be used to trigger passes from git remotes (e.g. GitHub, GitLab) with webhooks.
/// Given that your server can be reached from the outside, you can pass your server's hostname
/// or IP address and have the steps running on git changes immediately, instead of waiting
/// for the next poll.
pub struct HttpTrigger {
    http: String,
}

impl HttpTrigger {
    /// Create an new HTTP trigger with a HTTP url. It accepts an address as a string,
    /// for example "0.0.0.0:1234".
    pub fn new(http: String) -> Self {
        Self { http }
    }
}

impl Trigger for HttpTrigger {
    /// Starts a minimal HTTP 1.1 server, that triggers on every request.
    ///
    /// Every method and every URL returns 200 status code with plaintext "OK".
    fn listen(&self, tx: Sender<Option<Context>>) -> Result<(), TriggerError> {
        let listener = Server::http(&self.http).map_err(|err| {
            TriggerError::Misconfigured(format!("cannot start server on {}: {err}", self.http))
        })?;
        info!("Listening for webhooks on {}...", self.http);
        for request in listener.incoming_requests() {
            debug!("Received request on {} {}", request.method(), request.url());

            let context: Context = HashMap::from([
                ("TRIGGER_NAME", TRIGGER_NAME.to_string()),
                ("HTTP_METHOD", request.method().to_string()),
                ("HTTP_URL", request.url().to_string()),
            ]);
            tx.send(Some(context))?;

            request
                .respond(Response::from_string("OK"))
                .map_err(|err| TriggerError::FailedTrigger(err.to_string()))?;
        }
        Ok(())
    }
}
