use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use core::time::Duration;
use std::path::PathBuf;
use turbo_routing::geocoding::MapboxConfig;
use turbo_routing::{Coordinates, CourierId, DEFAULT_DEPOT, ZoneId};

fn default_workers() -> usize {
    num_cpus::get().clamp(1, 4)
}

/// Runtime configuration for the `turbo-routing-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults for a Buenos Aires depot.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "turbo-routing-server",
    version,
    about = "Geocoding, delivery zones and automatic courier assignment"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding `shipments.json`, `couriers.json`, `zones.json`,
    /// `assignments.json` and `geocoding_cache.json`.
    ///
    /// Environment variable: `DATA_DIR`
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Mapbox access token. Without it every provider call fails and
    /// shipments without coordinates are reported as geocoding failures.
    ///
    /// Environment variable: `MAPBOX_TOKEN`
    #[arg(long, env = "MAPBOX_TOKEN", hide_env_values = true)]
    pub mapbox_token: Option<String>,

    /// Environment variable: `MAPBOX_BASE_URL`
    #[arg(long, env = "MAPBOX_BASE_URL", default_value = MapboxConfig::DEFAULT_BASE_URL)]
    pub mapbox_base_url: String,

    /// ISO 3166-1 alpha-2 country every lookup is restricted to.
    ///
    /// Environment variable: `GEOCODE_COUNTRY`
    #[arg(long, env = "GEOCODE_COUNTRY", default_value = "ar")]
    pub geocode_country: String,

    /// Environment variable: `GEOCODE_LANGUAGE`
    #[arg(long, env = "GEOCODE_LANGUAGE", default_value = "es")]
    pub geocode_language: String,

    /// City appended to every address before geocoding.
    ///
    /// Environment variable: `CITY`
    #[arg(long, env = "CITY", default_value = "Buenos Aires")]
    pub city: String,

    /// Minimum delay between two provider calls, in milliseconds. Mapbox
    /// allows 600 requests per minute.
    ///
    /// Environment variable: `GEOCODE_DELAY_MS`
    #[arg(long, env = "GEOCODE_DELAY_MS", default_value_t = 100)]
    pub geocode_delay_ms: u64,

    /// Environment variable: `GEOCODE_TIMEOUT_SECS`
    #[arg(long, env = "GEOCODE_TIMEOUT_SECS", default_value_t = 10)]
    pub geocode_timeout_secs: u64,

    /// Depot latitude, the reference point for zone labels.
    ///
    /// Environment variable: `DEPOT_LAT`
    #[arg(long, env = "DEPOT_LAT", default_value_t = DEFAULT_DEPOT.lat, allow_negative_numbers = true)]
    pub depot_lat: f64,

    /// Environment variable: `DEPOT_LON`
    #[arg(long, env = "DEPOT_LON", default_value_t = DEFAULT_DEPOT.lon, allow_negative_numbers = true)]
    pub depot_lon: f64,

    /// Tolerance around zone boundaries, in metres.
    ///
    /// Environment variable: `ZONE_BUFFER_M`
    #[arg(long, env = "ZONE_BUFFER_M", default_value_t = 100.0)]
    pub zone_buffer_m: f64,

    /// Randomized restarts per clustering run.
    ///
    /// Environment variable: `CLUSTER_RESTARTS`
    #[arg(long, env = "CLUSTER_RESTARTS", default_value_t = 10)]
    pub cluster_restarts: usize,

    /// Number of zone-generation workers.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = default_workers())]
    pub num_workers: usize,

    /// Seconds between assignment passes in `serve` mode.
    ///
    /// Environment variable: `ASSIGN_INTERVAL_SECS`
    #[arg(long, env = "ASSIGN_INTERVAL_SECS", default_value_t = 60)]
    pub assign_interval_secs: u64,

    /// How long a read of `shipments.json` is reused.
    ///
    /// Environment variable: `SHIPMENT_TTL_SECS`
    #[arg(long, env = "SHIPMENT_TTL_SECS", default_value_t = 30)]
    pub shipment_ttl_secs: u64,

    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run assignment passes on an interval until interrupted.
    Serve,
    /// Regenerate the zone set from the pending shipments.
    Plan {
        /// Number of zones to generate.
        #[arg(short, long, default_value_t = 5)]
        zones: usize,
    },
    /// Run a single assignment pass.
    Assign,
    /// Geocode one address through the cache.
    Geocode {
        address: String,
        /// Bypass and overwrite the cached entry.
        #[arg(long)]
        force: bool,
    },
    /// Bind a courier to a zone; omit `--courier` to unbind the zone.
    Bind {
        #[arg(long)]
        zone: ZoneId,
        #[arg(long)]
        courier: Option<CourierId>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub command: Command,
    pub data_dir: PathBuf,
    pub mapbox: MapboxConfig,
    pub country: String,
    pub language: String,
    pub city: String,
    pub geocode_delay: Duration,
    pub depot: Coordinates,
    pub zone_buffer_m: f64,
    pub cluster_restarts: usize,
    pub num_workers: usize,
    pub assign_interval: Duration,
    pub shipment_ttl: Duration,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.cluster_restarts == 0 {
            bail!("CLUSTER_RESTARTS must be greater than 0");
        }

        if args.assign_interval_secs == 0 {
            bail!("ASSIGN_INTERVAL_SECS must be greater than 0");
        }

        if args.geocode_timeout_secs == 0 {
            bail!("GEOCODE_TIMEOUT_SECS must be greater than 0");
        }

        if !args.zone_buffer_m.is_finite() || args.zone_buffer_m < 0.0 {
            bail!("ZONE_BUFFER_M must be a non-negative number of metres");
        }

        let depot = Coordinates::new(args.depot_lat, args.depot_lon);
        if !depot.is_valid() {
            bail!("DEPOT_LAT/DEPOT_LON ({depot}) are not valid coordinates");
        }

        let country = args.geocode_country.trim().to_lowercase();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!(
                "GEOCODE_COUNTRY must be an ISO 3166-1 alpha-2 code, got '{}'",
                args.geocode_country
            );
        }

        if let Command::Plan { zones: 0 } = args.command {
            bail!("--zones must be greater than 0");
        }

        Ok(Self {
            command: args.command,
            data_dir: args.data_dir,
            mapbox: MapboxConfig {
                access_token: args.mapbox_token.unwrap_or_default(),
                base_url: args.mapbox_base_url,
                timeout: Duration::from_secs(args.geocode_timeout_secs),
            },
            country,
            language: args.geocode_language,
            city: args.city,
            geocode_delay: Duration::from_millis(args.geocode_delay_ms),
            depot,
            zone_buffer_m: args.zone_buffer_m,
            cluster_restarts: args.cluster_restarts,
            num_workers: args.num_workers,
            assign_interval: Duration::from_secs(args.assign_interval_secs),
            shipment_ttl: Duration::from_secs(args.shipment_ttl_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            std::iter::once("turbo-routing-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn defaults_target_buenos_aires() {
        let config = parse(&["assign"]).unwrap();
        assert_eq!(config.command, Command::Assign);
        assert_eq!(config.depot, DEFAULT_DEPOT);
        assert_eq!(config.country, "ar");
        assert_eq!(config.geocode_delay, Duration::from_millis(100));
        assert_eq!(config.zone_buffer_m, 100.0);
    }

    #[test]
    fn parses_subcommands() {
        assert_eq!(
            parse(&["plan", "--zones", "4"]).unwrap().command,
            Command::Plan { zones: 4 }
        );
        assert_eq!(
            parse(&["bind", "--zone", "3"]).unwrap().command,
            Command::Bind {
                zone: 3,
                courier: None
            }
        );
        assert_eq!(
            parse(&["geocode", "Av. Corrientes 1234", "--force"])
                .unwrap()
                .command,
            Command::Geocode {
                address: "Av. Corrientes 1234".to_string(),
                force: true
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--num-workers", "0", "assign"]).is_err());
        assert!(parse(&["--geocode-country", "arg", "assign"]).is_err());
        assert!(parse(&["--depot-lat", "-95", "assign"]).is_err());
        assert!(parse(&["--zone-buffer-m", "-1", "assign"]).is_err());
        assert!(parse(&["plan", "--zones", "0"]).is_err());
    }

    #[test]
    fn country_is_normalized() {
        let config = parse(&["--geocode-country", " AR ", "assign"]).unwrap();
        assert_eq!(config.country, "ar");
    }
}
