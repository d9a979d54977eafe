//! worklog settings command implementations.

use serde::Serialize;

use crate::ai::{
    ChatClient, ChatSettings, ADDRESS_SETTING, KEY_SETTING, MODEL_SETTING, PROMPT_SETTING,
    SETTINGS_NAMESPACE,
};
use crate::cli::Context;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::settings::Namespace;

const KNOWN_KEYS: [&str; 4] = [KEY_SETTING, ADDRESS_SETTING, MODEL_SETTING, PROMPT_SETTING];

#[derive(Serialize)]
struct SettingsOutput {
    #[serde(flatten)]
    chat: ChatSettings,
    key: String,
    complete: bool,
}

#[derive(Serialize)]
struct SetOutput {
    key: String,
}

#[derive(Serialize)]
struct VerifyOutput {
    valid: bool,
    model: String,
    base_url: String,
}

pub fn run_show(ctx: Context, output: OutputOptions) -> Result<()> {
    let chat = ChatSettings::resolve(&ctx.config.ai, &ctx.settings);
    let complete = chat.check_complete().is_ok();

    let mut human = HumanOutput::new("AI settings");
    human.push_summary("Key", display_or_unset(&chat.masked_key()));
    human.push_summary("Address", display_or_unset(&chat.base_url));
    human.push_summary("Model", display_or_unset(&chat.model));
    human.push_summary("Timeout", format!("{}s", chat.timeout_secs));
    human.push_detail(format!("Prompt: {}", chat.prompt));
    if !complete {
        human.push_next_step("worklog settings set key <api-key>");
    }

    let data = SettingsOutput {
        key: chat.masked_key(),
        complete,
        chat,
    };
    emit_success(output, "settings show", &data, Some(&human))
}

pub fn run_set(mut ctx: Context, key: &str, value: String, output: OutputOptions) -> Result<()> {
    let key = key.trim();
    if !KNOWN_KEYS.contains(&key) {
        return Err(Error::InvalidArgument(format!(
            "unknown setting '{key}' (expected one of: {})",
            KNOWN_KEYS.join(", ")
        )));
    }
    let value = value.trim().to_string();
    if key != PROMPT_SETTING && value.is_empty() {
        return Err(Error::InvalidArgument(format!("{key} cannot be empty")));
    }

    ctx.settings
        .set(&Namespace::new(SETTINGS_NAMESPACE), key, value)?;

    let human = HumanOutput::new(format!("Setting {key} saved"));
    let data = SetOutput {
        key: key.to_string(),
    };
    emit_success(output, "settings set", &data, Some(&human))
}

pub fn run_verify(ctx: Context, output: OutputOptions) -> Result<()> {
    let chat = ChatSettings::resolve(&ctx.config.ai, &ctx.settings);
    let client = ChatClient::new(chat);
    let valid = client.verify_key()?;

    let mut human = HumanOutput::new(if valid {
        "API key accepted"
    } else {
        "API key check returned no content"
    });
    human.push_summary("Endpoint", client.endpoint());
    human.push_summary("Model", client.settings().model.clone());

    let data = VerifyOutput {
        valid,
        model: client.settings().model.clone(),
        base_url: client.settings().base_url.clone(),
    };
    emit_success(output, "settings verify", &data, Some(&human))
}

fn display_or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "(unset)".to_string()
    } else {
        value.to_string()
    }
}
