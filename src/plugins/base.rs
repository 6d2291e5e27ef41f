//! The built-in `base` cog: cog administration, guild settings and help.
//!
//! Installed directly into the registry at startup; it has no backing file
//! and can never be disabled, so a guild always keeps access to `enable`.

use crate::domain::entities::{CommandSpec, Hint, BASE_COG};
use crate::plugins::cog::{Cog, CogModule, Context};
use regex_lite::Regex;

pub struct BaseCog;

impl CogModule for BaseCog {
    fn name_override(&self) -> Option<&str> {
        Some(BASE_COG)
    }

    fn setup(&self, cog: &mut Cog) {
        cog.register(
            CommandSpec::new("cogs")
                .with_help("List loaded cogs and whether they are enabled here")
                .with_handler(|ctx, _| {
                    let guild = ctx.guild();
                    let mut lines = Vec::new();
                    for record in ctx.cogs.records() {
                        if record.cog.is_none() {
                            lines.push(format!("{} [{}]", record.name, record.state.as_str()));
                        } else if guild.is_allowed(&record.name) {
                            lines.push(record.name.clone());
                        } else {
                            lines.push(format!("{} [disabled]", record.name));
                        }
                    }
                    lines.sort();
                    Ok(Some(lines.join("\n")))
                }),
        );

        cog.register(
            CommandSpec::new("help")
                .with_help("List available commands, or describe one command")
                .with_opt_param("command")
                .with_param_help("command", "command name, optionally cog-qualified")
                .with_handler(|ctx, bound| match bound.str(0) {
                    Some(name) => Ok(Some(describe(ctx, name))),
                    None => Ok(Some(overview(ctx))),
                }),
        );

        cog.register(
            CommandSpec::new("enable")
                .with_help("Re-enable a disabled cog on this guild")
                .with_param("cog")
                .with_permission("manage_guild")
                .with_handler(|ctx, bound| {
                    let name = bound.str(0).unwrap_or_default().to_string();
                    if !ctx.cogs.known(&name) {
                        return Ok(Some(format!("No such cog: `{}`", name)));
                    }
                    if ctx.guild().enable(&name) {
                        Ok(Some(format!("Cog `{}` enabled", name)))
                    } else {
                        Ok(Some(format!("Cog `{}` isn't disabled", name)))
                    }
                }),
        );

        cog.register(
            CommandSpec::new("disable")
                .with_help("Disable a cog on this guild")
                .with_param("cog")
                .with_permission("manage_guild")
                .with_handler(|ctx, bound| {
                    let name = bound.str(0).unwrap_or_default().to_string();
                    if name == BASE_COG {
                        return Ok(Some("The base cog can't be disabled".to_string()));
                    }
                    if !ctx.cogs.known(&name) {
                        return Ok(Some(format!("No such cog: `{}`", name)));
                    }
                    if ctx.guild().disable(&name) {
                        Ok(Some(format!("Cog `{}` disabled", name)))
                    } else {
                        Ok(Some(format!("Cog `{}` is already disabled", name)))
                    }
                }),
        );

        cog.register(
            CommandSpec::new("prefix")
                .with_help("List command prefixes, or add/remove one")
                .with_opt_param("prefix")
                .with_flag('a', "add the prefix")
                .with_flag('d', "remove the prefix")
                .with_permission("manage_guild")
                .with_fallback("prefixes")
                .with_handler(|ctx, bound| {
                    let Some(prefix) = bound.str(0) else {
                        return Ok(Some(list_prefixes(ctx)));
                    };
                    let mut guild = ctx.guild();
                    if bound.has_flag('d') {
                        if guild.remove_prefix(prefix) {
                            Ok(Some(format!("Prefix `{}` removed", prefix)))
                        } else {
                            Ok(Some(format!("`{}` isn't a prefix here", prefix)))
                        }
                    } else if guild.add_prefix(prefix) {
                        Ok(Some(format!("Prefix `{}` added", prefix)))
                    } else {
                        Ok(Some(format!("`{}` is already a prefix", prefix)))
                    }
                }),
        );

        // read-only fallback for members without manage_guild
        cog.register(
            CommandSpec::new("prefixes")
                .with_help("List command prefixes")
                .with_handler(|ctx, _| Ok(Some(list_prefixes(ctx)))),
        );
        cog.hide("prefixes");

        cog.register(
            CommandSpec::new("breaker")
                .with_help("Set the character separating commands in one message")
                .with_param("character")
                .with_hint("character", Hint::Pattern(breaker_pattern()))
                .with_permission("manage_guild")
                .with_handler(|ctx, bound| {
                    let ch = bound
                        .str(0)
                        .and_then(|s| s.chars().next())
                        .unwrap_or('|');
                    ctx.guild().set_breaker(ch);
                    Ok(Some(format!("Breaker set to `{}`", ch)))
                }),
        );

        cog.register(
            CommandSpec::new("lang")
                .with_help("Set this guild's language code")
                .with_param("code")
                .with_hint("code", Hint::Pattern(lang_pattern()))
                .with_permission("manage_guild")
                .with_handler(|ctx, bound| {
                    let code = bound.str(0).unwrap_or("en").to_lowercase();
                    ctx.guild().set_language(code.clone());
                    Ok(Some(format!("Language set to `{}`", code)))
                }),
        );
        cog.alias("language", "lang");

        cog.register(
            CommandSpec::new("timezone")
                .with_help("Set this guild's timezone, e.g. Europe/Paris")
                .with_param("zone")
                .with_permission("manage_guild")
                .with_handler(|ctx, bound| {
                    let zone = bound.str(0).unwrap_or("UTC").to_string();
                    ctx.guild().set_timezone(zone.clone());
                    Ok(Some(format!("Timezone set to `{}`", zone)))
                }),
        );
        cog.alias("tz", "timezone");

        cog.register(
            CommandSpec::new("version")
                .with_help("Show the running version")
                .with_handler(|_, _| {
                    Ok(Some(format!(
                        "{} v{}",
                        env!("CARGO_PKG_NAME"),
                        env!("CARGO_PKG_VERSION")
                    )))
                }),
        );

        cog.register(
            CommandSpec::new("echo")
                .with_help("Repeat the given text")
                .with_param("text")
                .full_text()
                .with_handler(|_, bound| Ok(bound.str(0).map(String::from))),
        );
        cog.hide("echo");
    }
}

fn breaker_pattern() -> Regex {
    Regex::new(r"[^\s\w]$").unwrap_or_else(|_| Regex::new(r".").expect("pattern"))
}

fn lang_pattern() -> Regex {
    Regex::new("^[A-Za-z]{2}$").unwrap_or_else(|_| Regex::new(r".").expect("pattern"))
}

fn list_prefixes(ctx: &Context) -> String {
    let guild = ctx.guild();
    let prefixes = guild.prefixes();
    if prefixes.is_empty() {
        "No prefixes are set; mention me instead".to_string()
    } else {
        format!(
            "Prefixes: {}",
            crate::application::messaging::pretty(prefixes, "`%s`", "and")
        )
    }
}

fn overview(ctx: &Context) -> String {
    let guild = ctx.guild();
    let mut lines = vec!["Available commands:".to_string()];
    for cog in ctx.cogs.loaded_cogs() {
        if !guild.is_allowed(&cog.name) {
            continue;
        }
        let visible = cog.table.visible(ctx.caps);
        if visible.is_empty() {
            continue;
        }
        let names: Vec<String> = visible.iter().map(|spec| spec.name.clone()).collect();
        lines.push(format!("**{}**: {}", cog.name, names.join(", ")));
    }
    drop(guild);
    lines.join("\n")
}

fn describe(ctx: &Context, name: &str) -> String {
    let guild = ctx.guild();
    let specs: Vec<_> = if let Some((cog_name, command)) = name.rsplit_once('.') {
        ctx.cogs
            .cog(cog_name)
            .filter(|_| guild.is_allowed(cog_name))
            .and_then(|cog| cog.table.get_permitted(command, ctx.caps))
            .map(|spec| vec![(cog_name.to_string(), spec)])
            .unwrap_or_default()
    } else {
        ctx.cogs.find_command(name, guild.settings(), ctx.caps)
    };
    drop(guild);
    if specs.is_empty() {
        return format!("No command `{}` found", name);
    }
    let mut lines = Vec::new();
    for (cog_name, spec) in specs {
        let mut usage = format!("{}.{}", cog_name, spec.name);
        for param in spec.params() {
            if param.required {
                usage.push_str(&format!(" <{}>", param.name));
            } else {
                usage.push_str(&format!(" [{}]", param.name));
            }
        }
        lines.push(format!("`{}`", usage));
        if let Some(help) = &spec.help {
            lines.push(format!("  {}", help));
        }
        for param in spec.params() {
            if !param.help.is_empty() {
                lines.push(format!("  {}: {}", param.name, param.help));
            }
        }
        for (flag, help) in &spec.flags {
            lines.push(format!("  -{}: {}", flag, help));
        }
    }
    lines.join("\n")
}
