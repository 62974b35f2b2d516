//! Request handling: form submissions, then file resolution.

use std::sync::Arc;

use log::debug;

use crate::parser::HttpRequest;
use crate::server::credentials::{CredentialStore, RegisterOutcome, VerifyOutcome};
use crate::server::error::Error;
use crate::server::resolver::{FileResource, Resolver};

/// Page that receives the login form.
pub const LOGIN_PAGE: &str = "/login.html";
/// Page that receives the register form.
pub const REGISTER_PAGE: &str = "/register.html";
/// Served after a successful login or registration.
pub const WELCOME_PAGE: &str = "/welcome.html";
/// Served when credentials are rejected.
pub const ERROR_PAGE: &str = "/error.html";
/// Served when a new account could not be stored.
pub const REGISTER_ERROR_PAGE: &str = "/registerError.html";

/// Turns a complete request into the file that answers it.
pub struct RequestHandler {
    resolver: Resolver,
    store: Arc<dyn CredentialStore>,
}

impl RequestHandler {
    pub fn new(resolver: Resolver, store: Arc<dyn CredentialStore>) -> Self {
        Self { resolver, store }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Runs the login/register flow for form posts, rewriting the request
    /// path to the result page, then resolves the path to a mapped file.
    pub fn handle(&self, request: &mut HttpRequest) -> Result<FileResource, Error> {
        if request.is_form() {
            if let Some(page) = self.submit_form(request) {
                request.path = page.to_string();
            }
        }
        self.resolver.resolve(&request.path)
    }

    fn submit_form(&self, request: &HttpRequest) -> Option<&'static str> {
        let is_login = match request.path.as_str() {
            LOGIN_PAGE => true,
            REGISTER_PAGE => false,
            _ => return None,
        };

        let form = request.form();
        let user = form.get("user").map(String::as_str).unwrap_or_default();
        let password = form.get("password").map(String::as_str).unwrap_or_default();
        if user.is_empty() || password.is_empty() {
            return Some(ERROR_PAGE);
        }

        let page = if is_login {
            let outcome = self.store.verify(user, password);
            debug!("login {user}: {outcome:?}");
            match outcome {
                VerifyOutcome::Success => WELCOME_PAGE,
                _ => ERROR_PAGE,
            }
        } else {
            let outcome = self.store.register(user, password);
            debug!("register {user}: {outcome:?}");
            match outcome {
                RegisterOutcome::Success => WELCOME_PAGE,
                RegisterOutcome::UsernameTaken => ERROR_PAGE,
                RegisterOutcome::StorageError => REGISTER_ERROR_PAGE,
            }
        };
        Some(page)
    }
}
