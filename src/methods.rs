//! Method registry and typed call wrappers.
//!
//! Every command in the registry gets an async wrapper on both clients, e.g.
//! `client.getinfo(())` or `client.dev_rhash(vec![json!(secret)])`. The
//! wrappers only shape arguments (see [`Params::from_args`]); the daemon is
//! the sole validator.
//!
//! Hyphenated wire names are also addressable by a camel-case identifier
//! (`dev-rhash` is `devRhash`) through [`lookup`] and the clients' `invoke`.

use serde_json::Value;

use crate::error::ClientError;
use crate::http::HttpClient;
use crate::ipc::LightningClient;
use crate::protocol::Params;

/// Expands `$callback!` with the registry as `rust_name => "wire-name"` pairs.
macro_rules! with_lightning_methods {
    ($callback:ident $(, $arg:tt)*) => {
        $callback! {
            [$($arg)*]
            addgossip => "addgossip",
            autocleaninvoice => "autocleaninvoice",
            check => "check",
            checkmessage => "checkmessage",
            close => "close",
            connect => "connect",
            createinvoice => "createinvoice",
            createonion => "createonion",
            datastore => "datastore",
            decode => "decode",
            decodepay => "decodepay",
            deldatastore => "deldatastore",
            delexpiredinvoice => "delexpiredinvoice",
            delinvoice => "delinvoice",
            delpay => "delpay",
            dev_compact_gossip_store => "dev-compact-gossip-store",
            dev_fail => "dev-fail",
            dev_forget_channel => "dev-forget-channel",
            dev_listaddrs => "dev-listaddrs",
            dev_memdump => "dev-memdump",
            dev_memleak => "dev-memleak",
            dev_rescan_outputs => "dev-rescan-outputs",
            dev_rhash => "dev-rhash",
            dev_sign_last_tx => "dev-sign-last-tx",
            disableoffer => "disableoffer",
            disconnect => "disconnect",
            feerates => "feerates",
            fetchinvoice => "fetchinvoice",
            fundchannel => "fundchannel",
            fundchannel_cancel => "fundchannel_cancel",
            fundchannel_complete => "fundchannel_complete",
            fundchannel_start => "fundchannel_start",
            fundpsbt => "fundpsbt",
            getinfo => "getinfo",
            getlog => "getlog",
            getroute => "getroute",
            help => "help",
            invoice => "invoice",
            keysend => "keysend",
            listchannels => "listchannels",
            listconfigs => "listconfigs",
            listdatastore => "listdatastore",
            listforwards => "listforwards",
            listfunds => "listfunds",
            listinvoices => "listinvoices",
            listnodes => "listnodes",
            listoffers => "listoffers",
            listpays => "listpays",
            listpeers => "listpeers",
            listsendpays => "listsendpays",
            listtransactions => "listtransactions",
            multifundchannel => "multifundchannel",
            multiwithdraw => "multiwithdraw",
            newaddr => "newaddr",
            notifications => "notifications",
            offer => "offer",
            openchannel_abort => "openchannel_abort",
            openchannel_bump => "openchannel_bump",
            openchannel_init => "openchannel_init",
            openchannel_signed => "openchannel_signed",
            openchannel_update => "openchannel_update",
            pay => "pay",
            ping => "ping",
            plugin => "plugin",
            reserveinputs => "reserveinputs",
            sendcustommsg => "sendcustommsg",
            sendinvoice => "sendinvoice",
            sendonion => "sendonion",
            sendpay => "sendpay",
            sendpsbt => "sendpsbt",
            setchannel => "setchannel",
            setchannelfee => "setchannelfee",
            signmessage => "signmessage",
            signpsbt => "signpsbt",
            stop => "stop",
            txdiscard => "txdiscard",
            txprepare => "txprepare",
            txsend => "txsend",
            unreserveinputs => "unreserveinputs",
            utxopsbt => "utxopsbt",
            waitanyinvoice => "waitanyinvoice",
            waitblockheight => "waitblockheight",
            waitinvoice => "waitinvoice",
            waitsendpay => "waitsendpay",
            withdraw => "withdraw",
        }
    };
}

macro_rules! method_table {
    ([] $($name:ident => $wire:literal),* $(,)?) => {
        /// Wire names of every registered method.
        pub const METHODS: &[&str] = &[$($wire),*];
    };
}

macro_rules! impl_method_calls {
    ([$client:ty] $($name:ident => $wire:literal),* $(,)?) => {
        impl $client {
            $(
                #[doc = concat!("Call `", $wire, "`.")]
                ///
                /// `params` is `()` for no arguments, a `Vec<Value>` argument
                /// list, or a single `Value` argument (an array is sent as one
                /// positional argument, not spread).
                pub async fn $name(&self, params: impl Into<Params>) -> Result<Value, ClientError> {
                    self.call($wire, params).await
                }
            )*

            /// Call a registered method by wire name or camel-case
            /// identifier, shaping `args` like the typed wrappers do.
            ///
            /// # Errors
            ///
            /// Returns `ClientError::UnknownMethod` if `identifier` is not
            /// in the registry.
            pub async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ClientError> {
                let method = lookup(identifier)
                    .ok_or_else(|| ClientError::UnknownMethod(identifier.to_string()))?;
                self.call(method, Params::from_args(args)).await
            }
        }
    };
}

with_lightning_methods!(method_table);
with_lightning_methods!(impl_method_calls, LightningClient);
with_lightning_methods!(impl_method_calls, HttpClient);

/// Camel-case identifier for a wire name: each `-x` becomes `X`.
///
/// Only a hyphen followed by a lowercase ASCII letter is rewritten.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('-', Some(next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Resolve a wire name or its camel-case identifier to the wire name.
pub fn lookup(identifier: &str) -> Option<&'static str> {
    METHODS
        .iter()
        .copied()
        .find(|wire| *wire == identifier || camel_case(wire) == identifier)
}
