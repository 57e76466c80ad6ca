//! The OpenR link-state daemon.

use super::{BuildContext, Daemon, platform};
use crate::error::ConfigurationError;
use ipmesh_lib::{ConfigTree, Interface, IpPrefix, TopologyView, Value};

pub(crate) const KIND: &str = "openr";

/// Glog verbosity applied to modules listed in the `debug` option.
const DEBUG_VERBOSITY: u8 = 2;

/// Keys owned by [`OpenrBase`].
const BASE_KEYS: [&str; 2] = ["debug", "log_dir"];

/// Per-interface keys; each may be overridden by an interface property
/// `openr_<key>`.
const INTERFACE_KEYS: [&str; 3] = ["domain", "spark_hold_time_s", "spark_keepalive_time_s"];

#[derive(Debug, Clone, Copy)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Bool(b) => Self::Bool(b),
            Scalar::Int(i) => Self::Int(i),
            Scalar::Str(s) => Self::from(s),
        }
    }
}

use Scalar::{Bool, Int, Str};

/// Default OpenR flags.
const OPENR_DEFAULTS: &[(&str, Scalar)] = &[
    ("alloc_prefix_len", Int(128)),
    ("assume_drained", Bool(false)),
    ("config_store_filepath", Str("/tmp/aq_persistent_config_store.bin")),
    ("decision_debounce_max_ms", Int(250)),
    ("decision_debounce_min_ms", Int(10)),
    ("decision_rep_port", Int(60004)),
    ("domain", Str("openr")),
    ("dryrun", Bool(false)),
    ("enable_subnet_validation", Bool(true)),
    ("enable_fib_sync", Bool(false)),
    ("enable_health_checker", Bool(false)),
    ("enable_legacy_flooding", Bool(true)),
    ("enable_lfa", Bool(false)),
    ("enable_netlink_fib_handler", Bool(true)),
    ("enable_netlink_system_handler", Bool(true)),
    ("enable_old_decision_module", Bool(false)),
    ("enable_perf_measurement", Bool(true)),
    ("enable_prefix_alloc", Bool(false)),
    ("enable_rtt_metric", Bool(true)),
    ("enable_secure_thrift_server", Bool(false)),
    ("enable_segment_routing", Bool(false)),
    ("enable_spark", Bool(true)),
    ("enable_v4", Bool(false)),
    ("enable_watchdog", Bool(true)),
    ("fib_handler_port", Int(60100)),
    ("fib_rep_port", Int(60009)),
    ("health_checker_ping_interval_s", Int(3)),
    ("health_checker_rep_port", Int(60012)),
    ("iface_prefixes", Str("terra,nic1,nic2")),
    ("iface_regex_exclude", Str("")),
    ("iface_regex_include", Str("")),
    ("ip_tos", Int(192)),
    ("key_prefix_filters", Str("")),
    ("kvstore_flood_msg_per_sec", Int(0)),
    ("kvstore_flood_msg_burst_size", Int(0)),
    ("kvstore_ttl_decrement_ms", Int(1)),
    ("kvstore_zmq_hwm", Int(65536)),
    ("link_flap_initial_backoff_ms", Int(1000)),
    ("link_flap_max_backoff_ms", Int(60000)),
    ("link_monitor_cmd_port", Int(60006)),
    ("loopback_iface", Str("lo")),
    ("memory_limit_mb", Int(300)),
    ("min_log_level", Int(0)),
    ("override_loopback_addr", Bool(false)),
    ("prefix_manager_cmd_port", Int(60011)),
    ("prefixes", Str("")),
    ("redistribute_ifaces", Str("lo1")),
    ("seed_prefix", Str("")),
    ("set_leaf_node", Bool(false)),
    ("set_loopback_addr", Bool(false)),
    ("spark_fastinit_keepalive_time_ms", Int(100)),
    ("spark_hold_time_s", Int(30)),
    ("spark_keepalive_time_s", Int(3)),
    ("static_prefix_alloc", Bool(false)),
    ("tls_acceptable_peers", Str("")),
    ("tls_ecc_curve_name", Str("prime256v1")),
    ("tls_ticket_seed_path", Str("")),
    ("verbosity", Int(1)),
    ("x509_ca_path", Str("")),
    ("x509_cert_path", Str("")),
    ("x509_key_path", Str("")),
];

pub(crate) fn write_table(defaults: &mut ConfigTree, table: &[(&str, Scalar)]) {
    for (key, value) in table {
        defaults.set(*key, Value::from(*value));
    }
}

/// Settings shared by every daemon of the OpenR suite: debug modules and
/// the log directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenrBase;

impl OpenrBase {
    pub fn set_defaults(defaults: &mut ConfigTree) {
        defaults.set("debug", Value::List(Vec::new()));
        // Empty selects the node's log directory.
        defaults.set("log_dir", "");
    }

    /// Start a tree with `log_dir`, `vmodule` and every non-base option.
    #[must_use]
    pub fn build(ctx: &BuildContext<'_>) -> ConfigTree {
        let options = ctx.options();
        let log_dir = match options.get_str("log_dir") {
            Some(dir) if !dir.is_empty() => dir.to_owned(),
            _ => ctx.log_dir().display().to_string(),
        };
        let vmodule: Vec<Value> = options
            .get_list("debug")
            .unwrap_or_default()
            .iter()
            .map(|module| Value::from(format!("{module}={DEBUG_VERBOSITY}")))
            .collect();

        let mut cfg = ConfigTree::new()
            .with("log_dir", log_dir)
            .with("vmodule", vmodule);
        for (key, value) in options.iter().filter(|(k, _)| !BASE_KEYS.contains(k)) {
            cfg.set(key, value.clone());
        }
        cfg
    }
}

/// Whether OpenR should run its neighbour discovery on `itf`: the interface
/// must face a router.
pub fn is_active_interface(topology: &impl TopologyView, itf: &Interface) -> bool {
    itf.peer()
        .and_then(|peer| topology.interface(peer))
        .is_some_and(|peer| topology.is_router(peer.node()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Openr;

impl Openr {
    fn interface_entry(
        ctx: &BuildContext<'_>,
        itf: &Interface,
    ) -> Result<ConfigTree, ConfigurationError> {
        let mut entry = ConfigTree::new()
            .with("description", itf.describe())
            .with("name", itf.id().as_str())
            .with("active", is_active_interface(ctx.topology(), itf));
        for key in INTERFACE_KEYS {
            let Some(value) = ctx.interface_value(itf, KIND, key) else {
                continue;
            };
            let expected = ctx.options().get(key).map(Value::kind);
            if expected.is_some_and(|kind| kind != value.kind()) {
                return Err(ConfigurationError::InvalidOption {
                    node: ctx.node().clone(),
                    kind: KIND.to_owned(),
                    key: key.to_owned(),
                    reason: format!(
                        "interface `{}` property holds a {}",
                        itf.id(),
                        value.kind()
                    ),
                });
            }
            entry.set(key, value.clone());
        }
        Ok(entry)
    }

    fn networks(ctx: &BuildContext<'_>) -> Result<Vec<IpPrefix>, ConfigurationError> {
        let mut networks: Vec<IpPrefix> = Vec::new();
        for itf in ctx.interfaces() {
            for addr in itf.addresses().iter().filter(|a| a.is_ipv4()) {
                let net = addr.network();
                if !networks.contains(&net) {
                    networks.push(net);
                }
            }
        }
        if networks.is_empty() {
            return Err(ConfigurationError::MissingProperty {
                node: ctx.node().clone(),
                kind: KIND.to_owned(),
                property: "an IPv4 address on at least one interface".to_owned(),
            });
        }
        Ok(networks)
    }
}

impl Daemon for Openr {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[platform::KIND]
    }

    fn exclusive_keys(&self) -> &'static [&'static str] {
        &["domain"]
    }

    fn set_defaults(&self, defaults: &mut ConfigTree) {
        OpenrBase::set_defaults(defaults);
        write_table(defaults, OPENR_DEFAULTS);
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<ConfigTree, ConfigurationError> {
        let options = ctx.options();
        let mut cfg = OpenrBase::build(ctx);

        if options.is_default("fib_handler_port") {
            if let Some(port) = ctx
                .dependency(platform::KIND)
                .and_then(|p| p.get_int("fib_handler_port"))
            {
                cfg.set("fib_handler_port", port);
            }
        }

        let networks = Self::networks(ctx)?;
        let mut interfaces = Vec::new();
        let mut active = Vec::new();
        for itf in ctx.interfaces() {
            if is_active_interface(ctx.topology(), itf) {
                active.push(regex::escape(itf.id().as_str()));
            }
            interfaces.push(Value::from(Self::interface_entry(ctx, itf)?));
        }

        if options.is_default("iface_regex_include") && !active.is_empty() {
            cfg.set("iface_regex_include", format!("^({})$", active.join("|")));
        }
        if options.is_default("prefixes") {
            let prefixes: Vec<String> = networks.iter().map(ToString::to_string).collect();
            cfg.set("prefixes", prefixes.join(","));
        }

        cfg.set("interfaces", interfaces);
        cfg.set("networks", Value::list(networks.iter().map(ToString::to_string)));
        Ok(cfg)
    }
}
