//! Unary command calls over an abstract transport.
//!
//! ```text
//!  Client::call::<C>(args)                        Dispatch::dispatch(name, bytes)
//!   Idle -> Encoding -> InFlight ---- bytes ----> ServerContext::serve::<C>
//!                                                   decode args, run handler,
//!   Complete <- Decoding <------------ bytes ----   stamp + encode response
//!        \__ Failed (transport or decode error)
//! ```

use core::future::Future;
use core::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, trace, warn};

use crate::catalog::{Command, CommandArgs};
use crate::codec::Message;
use crate::config::CodecConfig;
use crate::envelope::{Code, Empty, Payload, Response};
use crate::error::CallError;

/// Carries encoded requests to the OBC and returns the encoded response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, command: &str, request: Vec<u8>) -> Result<Vec<u8>, CallError>;

    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

/// Server side entry point: route one encoded request by command name.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, command: &str, request: Vec<u8>) -> Result<Vec<u8>, CallError>;
}

/// Lifecycle of a single call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Encoding,
    InFlight,
    Decoding,
    Complete,
    Failed,
}

struct CallTrace {
    command: &'static str,
    state: CallState,
}

impl CallTrace {
    fn new(command: &'static str) -> Self {
        CallTrace {
            command,
            state: CallState::Idle,
        }
    }

    fn advance(&mut self, next: CallState) {
        trace!("{}: {:?} -> {:?}", self.command, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: CallError) -> CallError {
        warn!("{}: failed while {:?}: {}", self.command, self.state, err);
        self.advance(CallState::Failed);
        err
    }
}

pub struct Client<T> {
    transport: T,
    config: CodecConfig,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, CodecConfig::default())
    }

    pub fn with_config(transport: T, config: CodecConfig) -> Self {
        Client { transport, config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `args` as command `C` and decode its response.
    ///
    /// No partial response is returned when decoding fails.
    pub async fn call<C: Command>(&self, args: &C::Args) -> Result<Response<C::Data>, CallError> {
        let mut call = CallTrace::new(C::NAME);

        call.advance(CallState::Encoding);
        let request = args.encode_to_vec();

        call.advance(CallState::InFlight);
        debug!(
            "{} -> {} ({} bytes, timeout {} ms, issued {:?}) via {}",
            C::NAME,
            C::ID,
            request.len(),
            args.timeout(),
            args.date_time(),
            self.transport.name()
        );
        let reply = match self.transport.call(C::NAME, request).await {
            Ok(reply) => reply,
            Err(e) => return Err(call.fail(e)),
        };

        call.advance(CallState::Decoding);
        let response = match Response::<C::Data>::decode_with(&reply, self.config) {
            Ok(response) => response,
            Err(source) => {
                return Err(call.fail(CallError::Decode {
                    what: <Response<C::Data> as Message>::descriptor().name,
                    source,
                }))
            }
        };
        if response.cmd_id != 0 && response.cmd_id != C::ID {
            warn!(
                "{}: response carries cmdId {} instead of {}",
                C::NAME,
                response.cmd_id,
                C::ID
            );
        }

        call.advance(CallState::Complete);
        Ok(response)
    }
}

/// Response a service gives for a command it does not implement.
pub fn not_implemented<C: Command>() -> Response<C::Data> {
    let mut response = Response::new(C::ID);
    response.code(Code::NOT_IMPL);
    response
}

/// Shared server state: codec settings and the instance id counter.
#[derive(Debug)]
pub struct ServerContext {
    config: CodecConfig,
    next_inst_id: AtomicU64,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl ServerContext {
    pub fn new(config: CodecConfig) -> Self {
        ServerContext {
            config,
            next_inst_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn next_inst_id(&self) -> u64 {
        self.next_inst_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Decode the args of `C`, run `handler` and encode what it returns.
    pub async fn serve<C, F, Fut>(&self, request: &[u8], handler: F) -> Result<Vec<u8>, CallError>
    where
        C: Command,
        F: FnOnce(C::Args) -> Fut + Send,
        Fut: Future<Output = Response<C::Data>> + Send,
    {
        let args = <C::Args as Message>::decode_with(request, self.config).map_err(|source| {
            warn!("{}: rejecting request: {}", C::NAME, source);
            CallError::Decode {
                what: <C::Args as Message>::descriptor().name,
                source,
            }
        })?;
        debug!(
            "serving {} ({}), timeout {} ms, issued {:?}",
            C::NAME,
            C::ID,
            args.timeout(),
            args.date_time()
        );
        let mut response = handler(args).await;
        self.stamp(&mut response, C::ID);
        Ok(response.encode_to_vec())
    }

    /// Answer for a command name the catalog does not know.
    pub fn command_not_found(&self, command: &str) -> Vec<u8> {
        warn!("unknown command `{}`", command);
        let mut response = Response::<Empty>::new(0);
        response.code(Code::CMD_DNE);
        self.stamp(&mut response, 0);
        response.encode_to_vec()
    }

    /// Fill envelope fields the handler left at default.
    fn stamp<D: Payload>(&self, response: &mut Response<D>, cmd_id: u32) {
        if response.cmd_id == 0 {
            response.cmd_id = cmd_id;
        }
        if response.date_time.is_none() {
            response.date_time = Some(Utc::now());
        }
        if response.cmd_inst_id == 0 {
            response.cmd_inst_id = self.next_inst_id();
        }
    }
}

/// In-process transport that hands requests straight to a dispatcher.
pub struct Loopback<D> {
    server: D,
}

impl<D: Dispatch> Loopback<D> {
    pub fn new(server: D) -> Self {
        Loopback { server }
    }

    pub fn server(&self) -> &D {
        &self.server
    }
}

#[async_trait]
impl<D: Dispatch> Transport for Loopback<D> {
    async fn call(&self, command: &str, request: Vec<u8>) -> Result<Vec<u8>, CallError> {
        self.server.dispatch(command, request).await
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}
