//! Connection and MTU state for the single central.

use crate::{ConnectionHandle, ATT_MTU_MIN};

/// Events reported by the link layer about the central connection.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A central connected.
    Connected { connection: ConnectionHandle },
    /// The central connection ended.
    Disconnected { connection: ConnectionHandle },
    /// The ATT MTU exchange completed with the negotiated value.
    MtuExchanged { connection: ConnectionHandle, mtu: u16 },
    /// The ATT MTU exchange failed; the floor value stays in effect.
    MtuExchangeFailed { connection: ConnectionHandle },
    /// The central asked for new connection parameters.
    ParamUpdateRequest { connection: ConnectionHandle },
    /// The connection parameters changed.
    ParamUpdate { connection: ConnectionHandle },
    /// A previously sent indication was confirmed or abandoned.
    IndicationComplete { connection: ConnectionHandle, success: bool },
}

/// State of the one central connection.
pub(crate) struct Connection {
    pub(crate) handle: ConnectionHandle,
    /// The negotiated ATT MTU, never below 23.
    pub(crate) mtu: u16,
    /// A second, different client MTU seen after the first exchange. Some
    /// central stacks send one and then keep reading as if it applied; it is
    /// recorded for the read completion heuristic but never applied.
    pub(crate) second_client_mtu: u16,
    pub(crate) indication_in_flight: bool,
}

impl Connection {
    pub(crate) fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            mtu: ATT_MTU_MIN,
            second_client_mtu: 0,
            indication_in_flight: false,
        }
    }
}
