//! The service catalog.
//!
//! Every possible member of the topology is a data entry here: image, tier,
//! enablement flag, launch parameters, readiness probe, stop grace period.
//! Adding an optional service is a table change, not a new code path.
//!
//! Tier layout:
//!   10  db
//!   20  cache
//!   30  feature services the application server talks to
//!   40  server
//!   50  sidecars and backends that talk to the server
//!   60  proxy (front-end, last up, first down)

use crate::types::service::{
    EnvSpec, LaunchSpec, MountSpec, PortSource, PortSpec, Protocol, ReadinessProbe, ServiceSpec,
    TemplateValue::{Config, ConfigOr, Literal, ServiceHost},
};
use once_cell::sync::Lazy;
use std::time::Duration;

/// Name of the isolated bridge network shared by all services.
pub const NETWORK_NAME: &str = "nimbus-net";

/// Global advisory timeout for the whole-topology readiness wait.
pub const AGGREGATE_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll interval for the whole-topology readiness wait.
pub const AGGREGATE_WAIT_INTERVAL: Duration = Duration::from_secs(5);

const fn env(key: &'static str, value: crate::types::service::TemplateValue) -> EnvSpec {
    EnvSpec::new(key, value)
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// All possible services, in catalog order.
pub static CATALOG: Lazy<Vec<ServiceSpec>> = Lazy::new(|| {
    vec![
        // =====================================================================
        // Required core
        // =====================================================================
        ServiceSpec {
            name: "db",
            image: "postgres:16-alpine",
            image_override: None,
            tier: 10,
            optional: false,
            enable_flag: None,
            launch: LaunchSpec {
                cap_drop: vec!["NET_RAW"],
                env: vec![
                    env("POSTGRES_DB", Literal("nimbus")),
                    env("POSTGRES_USER", Literal("nimbus")),
                    env("POSTGRES_PASSWORD", Config("DATABASE_PASSWORD")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                mounts: vec![MountSpec::volume("nimbus_db", "/var/lib/postgresql/data")],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Exec {
                command: &["pg_isready", "-U", "nimbus", "-d", "nimbus"],
                retries: 30,
                interval: Duration::from_secs(5),
            },
            // Long grace period: the database may be flushing on shutdown.
            stop_timeout: secs(600),
        },
        ServiceSpec {
            name: "cache",
            image: "redis:7-alpine",
            image_override: None,
            tier: 20,
            optional: false,
            enable_flag: None,
            launch: LaunchSpec {
                read_only: true,
                tmpfs: vec!["/tmp"],
                cap_drop: vec!["NET_RAW"],
                env: vec![env("TZ", ConfigOr("TIMEZONE", "Etc/UTC"))],
                mounts: vec![MountSpec::volume("nimbus_cache", "/data")],
                command: vec![
                    Literal("redis-server"),
                    Literal("--requirepass"),
                    Config("CACHE_PASSWORD"),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(30),
        },
        ServiceSpec {
            name: "server",
            image: "nimbus/server:latest",
            image_override: Some("SERVER_IMAGE"),
            tier: 40,
            optional: false,
            enable_flag: None,
            launch: LaunchSpec {
                cap_drop: vec!["NET_RAW"],
                env: vec![
                    env("CLOUD_DOMAIN", Config("CLOUD_DOMAIN")),
                    env("ADMIN_PASSWORD", Config("ADMIN_PASSWORD")),
                    env("DATABASE_HOST", ServiceHost("db")),
                    env("DATABASE_NAME", Literal("nimbus")),
                    env("DATABASE_USER", Literal("nimbus")),
                    env("DATABASE_PASSWORD", Config("DATABASE_PASSWORD")),
                    env("REDIS_HOST", ServiceHost("cache")),
                    env("REDIS_PASSWORD", Config("CACHE_PASSWORD")),
                    // Feature wiring: hostnames are plain DNS names on the
                    // shared network; the application only dials them when
                    // the matching flag reads yes.
                    env("CLAMAV_ENABLED", ConfigOr("CLAMAV_ENABLED", "no")),
                    env("CLAMAV_HOST", ServiceHost("clamav")),
                    env("COLLABORA_ENABLED", ConfigOr("COLLABORA_ENABLED", "no")),
                    env("COLLABORA_HOST", ServiceHost("collabora")),
                    env("ONLYOFFICE_ENABLED", ConfigOr("ONLYOFFICE_ENABLED", "no")),
                    env("ONLYOFFICE_HOST", ServiceHost("onlyoffice")),
                    env("ONLYOFFICE_SECRET", ConfigOr("ONLYOFFICE_SECRET", "")),
                    env("TALK_ENABLED", ConfigOr("TALK_ENABLED", "no")),
                    env("TALK_HOST", ServiceHost("talk")),
                    env("TALK_PORT", ConfigOr("TALK_PORT", "3478")),
                    env("SIGNALING_SECRET", ConfigOr("SIGNALING_SECRET", "")),
                    env("RECORDING_ENABLED", ConfigOr("TALK_RECORDING_ENABLED", "no")),
                    env("RECORDING_HOST", ServiceHost("talk-recording")),
                    env("RECORDING_SECRET", ConfigOr("RECORDING_SECRET", "")),
                    env("IMAGINARY_ENABLED", ConfigOr("IMAGINARY_ENABLED", "no")),
                    env("IMAGINARY_HOST", ServiceHost("imaginary")),
                    env("FULLTEXTSEARCH_ENABLED", ConfigOr("FULLTEXTSEARCH_ENABLED", "no")),
                    env("FULLTEXTSEARCH_HOST", ServiceHost("fulltextsearch")),
                    env("WHITEBOARD_ENABLED", ConfigOr("WHITEBOARD_ENABLED", "no")),
                    env("WHITEBOARD_HOST", ServiceHost("whiteboard")),
                    env("WHITEBOARD_SECRET", ConfigOr("WHITEBOARD_SECRET", "")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                mounts: vec![
                    MountSpec::volume("nimbus_server", "/var/www/html"),
                    MountSpec::host("DATA_DIR", "/mnt/data"),
                    MountSpec::host_optional("MOUNT_DIR", "/mnt/external"),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Exec {
                command: &[
                    "sh",
                    "-c",
                    "curl -fsS -m 5 http://localhost/status.php | grep -q '\"installed\":true'",
                ],
                retries: 60,
                interval: Duration::from_secs(5),
            },
            stop_timeout: secs(60),
        },
        ServiceSpec {
            name: "push",
            image: "nimbus/push:latest",
            image_override: None,
            tier: 50,
            optional: false,
            enable_flag: None,
            launch: LaunchSpec {
                user: Some("33"),
                read_only: true,
                tmpfs: vec!["/tmp"],
                cap_drop: vec!["ALL"],
                env: vec![
                    env("SERVER_HOST", ServiceHost("server")),
                    env("DATABASE_HOST", ServiceHost("db")),
                    env("DATABASE_PASSWORD", Config("DATABASE_PASSWORD")),
                    env("REDIS_HOST", ServiceHost("cache")),
                    env("REDIS_PASSWORD", Config("CACHE_PASSWORD")),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
        ServiceSpec {
            name: "proxy",
            image: "caddy:2-alpine",
            image_override: None,
            tier: 60,
            optional: false,
            enable_flag: None,
            launch: LaunchSpec {
                cap_drop: vec!["ALL"],
                cap_add: vec!["NET_BIND_SERVICE"],
                ports: vec![
                    PortSpec {
                        host: PortSource::Config("PUBLIC_PORT", 443),
                        container: 443,
                        protocol: Protocol::Tcp,
                    },
                    PortSpec {
                        host: PortSource::Config("PUBLIC_PORT", 443),
                        container: 443,
                        protocol: Protocol::Udp,
                    },
                ],
                env: vec![
                    env("CLOUD_DOMAIN", Config("CLOUD_DOMAIN")),
                    env("SERVER_HOST", ServiceHost("server")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                mounts: vec![MountSpec::volume("nimbus_proxy", "/data")],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
        // =====================================================================
        // Optional feature services
        // =====================================================================
        ServiceSpec {
            name: "clamav",
            image: "clamav/clamav:1.3",
            image_override: None,
            tier: 30,
            optional: true,
            enable_flag: Some("CLAMAV_ENABLED"),
            launch: LaunchSpec {
                env: vec![env("TZ", ConfigOr("TIMEZONE", "Etc/UTC"))],
                mounts: vec![MountSpec::volume("nimbus_clamav", "/var/lib/clamav")],
                ..LaunchSpec::default()
            },
            // Signature download on first start is slow.
            probe: ReadinessProbe::Running { retries: 20, interval: Duration::from_secs(5) },
            stop_timeout: secs(30),
        },
        ServiceSpec {
            name: "collabora",
            image: "collabora/code:latest",
            image_override: None,
            tier: 30,
            optional: true,
            enable_flag: Some("COLLABORA_ENABLED"),
            launch: LaunchSpec {
                cap_add: vec!["MKNOD"],
                env: vec![
                    env("domain", Config("CLOUD_DOMAIN")),
                    env("dictionaries", ConfigOr("COLLABORA_DICTIONARIES", "en_US")),
                    env("extra_params", Literal("--o:ssl.enable=false --o:ssl.termination=true")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
        ServiceSpec {
            name: "onlyoffice",
            image: "onlyoffice/documentserver:latest",
            image_override: None,
            tier: 30,
            optional: true,
            enable_flag: Some("ONLYOFFICE_ENABLED"),
            launch: LaunchSpec {
                env: vec![
                    env("JWT_ENABLED", Literal("true")),
                    env("JWT_SECRET", Config("ONLYOFFICE_SECRET")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                mounts: vec![MountSpec::volume("nimbus_onlyoffice", "/var/www/onlyoffice/Data")],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 20, interval: Duration::from_secs(5) },
            stop_timeout: secs(10),
        },
        ServiceSpec {
            name: "talk",
            image: "nimbus/talk:latest",
            image_override: None,
            tier: 30,
            optional: true,
            enable_flag: Some("TALK_ENABLED"),
            launch: LaunchSpec {
                ports: vec![
                    PortSpec {
                        host: PortSource::Config("TALK_PORT", 3478),
                        container: 3478,
                        protocol: Protocol::Tcp,
                    },
                    PortSpec {
                        host: PortSource::Config("TALK_PORT", 3478),
                        container: 3478,
                        protocol: Protocol::Udp,
                    },
                ],
                env: vec![
                    env("CLOUD_DOMAIN", Config("CLOUD_DOMAIN")),
                    env("SIGNALING_SECRET", Config("SIGNALING_SECRET")),
                    env("INTERNAL_SECRET", ConfigOr("TALK_INTERNAL_SECRET", "")),
                    env("TALK_PORT", ConfigOr("TALK_PORT", "3478")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
        ServiceSpec {
            name: "talk-recording",
            image: "nimbus/talk-recording:latest",
            image_override: None,
            tier: 50,
            optional: true,
            enable_flag: Some("TALK_RECORDING_ENABLED"),
            launch: LaunchSpec {
                env: vec![
                    env("SERVER_HOST", ServiceHost("server")),
                    env("TALK_HOST", ServiceHost("talk")),
                    env("RECORDING_SECRET", Config("RECORDING_SECRET")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                mounts: vec![MountSpec::volume("nimbus_talk_recording", "/recordings")],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
        ServiceSpec {
            name: "imaginary",
            image: "h2non/imaginary:latest",
            image_override: None,
            tier: 30,
            optional: true,
            enable_flag: Some("IMAGINARY_ENABLED"),
            launch: LaunchSpec {
                read_only: true,
                tmpfs: vec!["/tmp"],
                cap_drop: vec!["ALL"],
                cap_add: vec!["SYS_NICE"],
                env: vec![env("PORT", Literal("9000"))],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
        ServiceSpec {
            name: "fulltextsearch",
            image: "elasticsearch:8.14.3",
            image_override: None,
            tier: 30,
            optional: true,
            enable_flag: Some("FULLTEXTSEARCH_ENABLED"),
            launch: LaunchSpec {
                env: vec![
                    env("discovery.type", Literal("single-node")),
                    env("xpack.security.enabled", Literal("false")),
                    env("ES_JAVA_OPTS", Literal("-Xms512m -Xmx512m")),
                    env("TZ", ConfigOr("TIMEZONE", "Etc/UTC")),
                ],
                mounts: vec![
                    MountSpec::volume("nimbus_fulltextsearch", "/usr/share/elasticsearch/data"),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 30, interval: Duration::from_secs(5) },
            stop_timeout: secs(30),
        },
        ServiceSpec {
            name: "whiteboard",
            image: "nimbus/whiteboard:latest",
            image_override: None,
            tier: 50,
            optional: true,
            enable_flag: Some("WHITEBOARD_ENABLED"),
            launch: LaunchSpec {
                env: vec![
                    env("JWT_SECRET_KEY", Config("WHITEBOARD_SECRET")),
                    env("STORAGE_STRATEGY", Literal("redis")),
                    env("REDIS_HOST", ServiceHost("cache")),
                    env("REDIS_PASSWORD", Config("CACHE_PASSWORD")),
                ],
                ..LaunchSpec::default()
            },
            probe: ReadinessProbe::Running { retries: 10, interval: Duration::from_secs(3) },
            stop_timeout: secs(10),
        },
    ]
});

/// All possible services.
pub fn catalog() -> &'static [ServiceSpec] {
    &CATALOG
}

/// Look up a service by name.
pub fn find(name: &str) -> Option<&'static ServiceSpec> {
    CATALOG.iter().find(|s| s.name == name)
}
