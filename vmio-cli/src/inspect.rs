//! Read-only commands: route, table, negotiate, job-code, config.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::json;
use tracing::debug;
use vmio::{ChannelConfig, CommandJobMap, JobCode, RoutingTable, SecurityLevel};
use vmio_proto::CommandId;

use crate::OutputFormat;

/// Arguments for `vmio route`.
#[derive(clap::Args)]
pub struct RouteArgs {
    /// Security level of the table.
    #[arg(short, long, default_value = "normal")]
    pub level: SecurityLevel,

    /// Use the server-side table instead of the client one.
    #[arg(long)]
    pub server: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Command numbers or names (e.g. 1001, VM_START).
    #[arg(required = true, num_args = 1..)]
    pub commands: Vec<String>,
}

/// Arguments for `vmio table`.
#[derive(clap::Args)]
pub struct TableArgs {
    /// Security level of the table.
    #[arg(short, long, default_value = "normal")]
    pub level: SecurityLevel,

    /// Use the server-side table instead of the client one.
    #[arg(long)]
    pub server: bool,

    /// Print the serialized wire form as hex.
    #[arg(long)]
    pub wire: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for `vmio negotiate`.
#[derive(clap::Args)]
pub struct NegotiateArgs {
    /// Security level of the proposing client.
    #[arg(long, default_value = "normal")]
    pub client: SecurityLevel,

    /// Security level of the accepting server.
    #[arg(long, default_value = "normal")]
    pub server: SecurityLevel,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for `vmio job-code`.
#[derive(clap::Args)]
pub struct JobCodeArgs {
    /// Treat arguments as job codes and print their commands.
    #[arg(short, long)]
    pub reverse: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Command or job-code numbers or names.
    #[arg(required = true, num_args = 1..)]
    pub args: Vec<String>,
}

/// Arguments for `vmio config`.
#[derive(clap::Args)]
pub struct ConfigArgs {
    /// Path to a JSON channel config.
    pub path: PathBuf,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Parses a command given as a number or a constant name.
pub(crate) fn parse_command(s: &str) -> Result<CommandId> {
    if let Ok(n) = s.parse::<u32>() {
        return Ok(CommandId(n));
    }
    CommandId::from_name(&s.to_ascii_uppercase()).ok_or_else(|| anyhow!("unknown command: {s}"))
}

/// Parses a job code given as a number or a constant name.
fn parse_job_code(s: &str) -> Result<JobCode> {
    let code = match s.parse::<u32>() {
        Ok(n) => JobCode::from_u32(n),
        Err(_) => JobCode::from_name(&s.to_ascii_uppercase()),
    };
    code.ok_or_else(|| anyhow!("unknown job code: {s}"))
}

pub(crate) fn pick(level: SecurityLevel, server: bool) -> &'static RoutingTable {
    if server {
        RoutingTable::server(level)
    } else {
        RoutingTable::client(level)
    }
}

pub fn route(args: &RouteArgs) -> Result<()> {
    let table = pick(args.level, args.server);
    let commands = args
        .commands
        .iter()
        .map(|s| parse_command(s))
        .collect::<Result<Vec<_>>>()?;

    if matches!(args.format, OutputFormat::Json) {
        let rows: Vec<_> = commands
            .iter()
            .map(|&cmd| {
                json!({
                    "command": cmd.0,
                    "name": cmd.name(),
                    "route": table.resolve(cmd),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<48} {:<20}", "COMMAND", "ROUTE");
    for cmd in commands {
        println!("{:<48} {:<20}", cmd.to_string(), table.resolve(cmd).to_string());
    }
    Ok(())
}

pub fn table(args: &TableArgs) -> Result<()> {
    let table = pick(args.level, args.server);
    if args.wire {
        let hex: String = table.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
        println!("{hex}");
        return Ok(());
    }
    print_table(table, args.format)
}

pub fn negotiate(args: &NegotiateArgs) -> Result<()> {
    debug!(client = %args.client, server = %args.server, "negotiating routing tables");
    let proposed = RoutingTable::client(args.client);
    let Some(agreed) = RoutingTable::server(args.server).accept(proposed) else {
        bail!(
            "a {} server refuses the {} client table",
            args.server,
            args.client
        );
    };
    print_table(&agreed, args.format)
}

fn print_table(table: &RoutingTable, format: OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Json) {
        let routes: Vec<_> = table
            .routes()
            .map(|(range, route)| json!({ "range": range.to_string(), "route": route }))
            .collect();
        let transports: Vec<_> = table.transports().collect();
        let obj = json!({
            "default": table.default_route(),
            "transports": transports,
            "routes": routes,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    let transports: Vec<String> = table.transports().map(|t| t.to_string()).collect();
    println!("default:    {}", table.default_route());
    println!("transports: {}", transports.join(", "));
    if table.routes().next().is_none() {
        return Ok(());
    }
    println!();
    println!("{:<48} {:<20}", "RANGE", "ROUTE");
    for (range, route) in table.routes() {
        println!("{:<48} {:<20}", range.to_string(), route.to_string());
    }
    Ok(())
}

pub fn job_code(args: &JobCodeArgs) -> Result<()> {
    let map = CommandJobMap::global();
    let pairs: Vec<(CommandId, JobCode)> = if args.reverse {
        args.args
            .iter()
            .map(|s| parse_job_code(s).map(|code| (map.command(code), code)))
            .collect::<Result<_>>()?
    } else {
        args.args
            .iter()
            .map(|s| parse_command(s).map(|cmd| (cmd, map.job_code(cmd))))
            .collect::<Result<_>>()?
    };

    if matches!(args.format, OutputFormat::Json) {
        let rows: Vec<_> = pairs
            .iter()
            .map(|&(cmd, code)| {
                json!({
                    "command": cmd.0,
                    "name": cmd.name(),
                    "job_code": code.name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<48} {:<40}", "COMMAND", "JOB CODE");
    for (cmd, code) in pairs {
        println!("{:<48} {:<40}", cmd.to_string(), code.name());
    }
    Ok(())
}

pub fn config(args: &ConfigArgs) -> Result<()> {
    let cfg = ChannelConfig::load(&args.path)
        .with_context(|| format!("loading {}", args.path.display()))?;

    if matches!(args.format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let endpoint = match &cfg.unix_socket {
        Some(path) => path.display().to_string(),
        None => format!("{}:{}", cfg.host, cfg.port),
    };
    println!("endpoint: {endpoint}");
    println!("security: {}", cfg.security_level);
    println!("session:  {}", cfg.session_id);
    println!("vm:       {}", cfg.vm_id);
    println!("timeout:  {:?}", cfg.connect_timeout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_by_number_or_name() {
        assert_eq!(parse_command("1001").unwrap(), CommandId::VM_START);
        assert_eq!(parse_command("vm_start").unwrap(), CommandId::VM_START);
        assert!(parse_command("NOT_A_COMMAND").is_err());
    }

    #[test]
    fn job_codes_parse_by_number_or_name() {
        assert_eq!(parse_job_code("0").unwrap(), JobCode::Unknown);
        assert_eq!(parse_job_code("srv_login").unwrap(), JobCode::SrvLogin);
        assert!(parse_job_code("4294967295").is_err());
    }
}
