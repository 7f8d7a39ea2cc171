//! Secrets requested by NetworkManager during activation.
//!
//! A secret agent calls [`request`] when the daemon needs a credential it
//! does not have. A password cached by the VPN pre-flight is handed out
//! first; otherwise the prompt goes through the broker and the agent waits
//! for [`submit`] or [`cancel`].

use std::collections::HashMap;

use log::{debug, info};

use crate::Result;
use crate::api::models::{ConnectionError, PromptReply, PromptRequest};
use crate::core::Context;
use crate::core::secrets::PendingSave;
use crate::types::constants::connection_type;

const ABANDONED: &str = "credential request abandoned";

fn is_vpn(request: &PromptRequest) -> bool {
    matches!(
        request.conn_type.as_str(),
        connection_type::VPN | connection_type::WIREGUARD
    )
}

/// Resolves the secrets for `request`, prompting if nothing is cached.
///
/// A timeout, a cancel reply or a broker shutdown ends the attempt that
/// asked: its progress flags are cleared and the error is published.
pub(crate) async fn request(ctx: &Context, request: PromptRequest) -> Result<PromptReply> {
    if is_vpn(&request) && !request.connection_uuid.is_empty() {
        if let Some(cached) = ctx.secrets.take_one_time(&request.connection_uuid) {
            debug!("Using cached secret for {}", request.connection_id);
            return Ok(PromptReply::secrets(cached, false));
        }
    }

    let vpn = is_vpn(&request);
    let uuid = request.connection_uuid.clone();
    let token = ctx.broker.ask(request)?;

    let mut guard = AbandonOnDrop {
        ctx,
        vpn,
        uuid: &uuid,
        armed: true,
    };
    let outcome = match ctx.broker.wait(&token, ctx.config.prompt_timeout).await {
        Ok(reply) if reply.cancel => Err(ConnectionError::UserCancelled),
        other => other,
    };
    guard.armed = false;

    if let Err(e) = &outcome {
        info!("Credential prompt {token} ended without secrets: {e}");
        abandon_attempt(ctx, vpn, &uuid, &e.to_string());
    }
    outcome
}

/// Ends the asking attempt if the request is dropped while still waiting.
struct AbandonOnDrop<'a> {
    ctx: &'a Context,
    vpn: bool,
    uuid: &'a str,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            info!("Credential request abandoned before an answer arrived");
            abandon_attempt(self.ctx, self.vpn, self.uuid, ABANDONED);
        }
    }
}

fn abandon_attempt(ctx: &Context, vpn: bool, uuid: &str, error: &str) {
    if vpn {
        let tracked = ctx
            .store
            .read(|s| s.is_connecting_vpn && (uuid.is_empty() || s.connecting_vpn_uuid == uuid));
        if tracked {
            ctx.fail_vpn_attempt(error);
        }
    } else if ctx.store.read(|s| s.is_connecting) {
        ctx.fail_wifi_attempt(error);
    }
}

/// Answers the prompt `token`. For a VPN prompt with `save`, the credentials
/// are written to the profile once the connection comes up.
pub(crate) fn submit(
    ctx: &Context,
    token: &str,
    secrets: HashMap<String, String>,
    save: bool,
) -> Result<()> {
    let request = ctx
        .broker
        .pending()
        .into_iter()
        .find(|p| p.token == token)
        .map(|p| p.request)
        .ok_or_else(|| ConnectionError::UnknownToken(token.to_string()))?;

    let pending_save = (save && is_vpn(&request) && !request.connection_uuid.is_empty()).then(|| {
        PendingSave {
            connection_path: request.connection_path.clone(),
            username: secrets.get("username").cloned().unwrap_or_default(),
            password: secrets.get("password").filter(|p| !p.is_empty()).cloned(),
        }
    });

    ctx.broker.resolve(token, PromptReply::secrets(secrets, save))?;
    if let Some(pending) = pending_save {
        ctx.secrets.record_pending_save(&request.connection_uuid, pending);
    }
    Ok(())
}

pub(crate) fn cancel(ctx: &Context, token: &str) -> Result<()> {
    ctx.broker.resolve(token, PromptReply::cancelled())
}
