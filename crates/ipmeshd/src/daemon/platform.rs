//! OpenR's Linux platform agent, which programs routes and links through
//! netlink on behalf of the routing daemon.

use super::openr::{OpenrBase, Scalar, write_table};
use super::{BuildContext, Daemon};
use crate::error::ConfigurationError;
use ipmesh_lib::ConfigTree;

pub(crate) const KIND: &str = "platform_linux";

const PLATFORM_DEFAULTS: &[(&str, Scalar)] = &[
    ("fib_handler_port", Scalar::Int(60100)),
    ("system_agent_port", Scalar::Int(60099)),
    ("enable_netlink_fib_handler", Scalar::Bool(true)),
    ("enable_netlink_system_handler", Scalar::Bool(true)),
    ("platform_thread_count", Scalar::Int(1)),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformLinux;

impl Daemon for PlatformLinux {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn set_defaults(&self, defaults: &mut ConfigTree) {
        OpenrBase::set_defaults(defaults);
        write_table(defaults, PLATFORM_DEFAULTS);
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<ConfigTree, ConfigurationError> {
        Ok(OpenrBase::build(ctx))
    }
}
