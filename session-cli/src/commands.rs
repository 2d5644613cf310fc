use std::io::{self, BufRead};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use session_client::{
    ApiError, ApiRequest, LoginRequest, SessionManager, UserClass, inspector,
};
use tracing::{debug, info};

pub struct CommandExecutor {
    manager: SessionManager,
}

impl CommandExecutor {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    pub async fn login(
        &self,
        class: UserClass,
        identifier: &str,
        password: Option<String>,
    ) -> Result<()> {
        let password = match password {
            Some(password) => password,
            None => read_password()?,
        };

        let metadata = self
            .manager
            .login(LoginRequest::password(class, identifier, &password))
            .await
            .map_err(report)?;

        info!(class = %metadata.user_class, "Login succeeded");
        print_json(&serde_json::json!({
            "success": true,
            "user_class": metadata.user_class.to_string(),
            "user_id": metadata.user_id,
            "display_name": metadata.display_name,
        }))
    }

    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        data: Option<&str>,
        query: Vec<(String, String)>,
    ) -> Result<()> {
        let mut request = ApiRequest::new(method, path);
        for (key, value) in query {
            request = request.with_query(key, value);
        }
        if let Some(data) = data {
            let body: serde_json::Value =
                serde_json::from_str(data).context("--data is not valid JSON")?;
            request.body = Some(body);
        }

        let response = self.manager.send(request).await.map_err(report)?;
        debug!(status = response.status.as_u16(), "Request completed");
        print_json(&response.body)
    }

    pub fn status(&self) -> Result<()> {
        let token = self.manager.access_token()?;
        let metadata = self.manager.metadata();
        let expires_in = token
            .as_deref()
            .and_then(|token| inspector::expires_in(token, Utc::now().timestamp()))
            .map(|remaining| remaining.as_secs());

        print_json(&serde_json::json!({
            "authenticated": self.manager.is_authenticated(),
            "user_class": metadata.as_ref().map(|m| m.user_class.to_string()),
            "user_id": metadata.as_ref().and_then(|m| m.user_id.clone()),
            "expires_in_secs": expires_in,
        }))
    }

    pub async fn refresh(&self) -> Result<()> {
        if self.manager.access_token()?.is_none() {
            bail!("no session stored; log in first");
        }
        let renewed = self.manager.ensure_fresh().await.map_err(report)?;
        print_json(&serde_json::json!({ "success": true, "renewed": renewed }))
    }

    pub fn logout(&self) -> Result<()> {
        self.manager.logout();
        print_json(&serde_json::json!({ "success": true }))
    }
}

/// Print the normalized error shape to stdout and hand the error back for
/// the exit status.
fn report(err: ApiError) -> anyhow::Error {
    if let Ok(json) = serde_json::to_string_pretty(&err) {
        println!("{json}");
    }
    err.into()
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password is required (--password or SESSIONCTL_PASSWORD)");
    }
    Ok(password)
}
