use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::commands::CommandHandler;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum StateError {
    #[error("MULTI calls can not be nested")]
    NestedMulti,
    #[error("no transaction in progress")]
    TransactionNotStarted,
}

/// A client blocked in `BLPOP`. The pusher hands the popped element over directly.
#[derive(Debug)]
pub struct BlpopSubscriber {
    pub client_address: String,
    pub sender: oneshot::Sender<String>,
}

/// A client blocked in `XREAD`. Every append to a watched stream wakes it up.
#[derive(Debug)]
pub struct XreadSubscriber {
    pub client_address: String,
    pub sender: mpsc::Sender<()>,
}

/// Progress of the replication handshake on a connection, as seen by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeStep {
    #[default]
    New,
    Pinged,
    PortSet,
    CapaSet,
    Synced,
}

/// Per-connection bookkeeping shared by all connections, keyed by client address.
#[derive(Debug, Default)]
pub struct State {
    blpop_subscribers: HashMap<String, VecDeque<BlpopSubscriber>>,
    xread_subscribers: HashMap<String, Vec<XreadSubscriber>>,
    transactions: HashMap<String, Vec<CommandHandler>>,
    handshakes: HashMap<String, HandshakeStep>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blpop_subscriber(&mut self, key: String, subscriber: BlpopSubscriber) {
        self.blpop_subscribers
            .entry(key)
            .or_default()
            .push_back(subscriber);
    }

    pub fn remove_blpop_subscriber(&mut self, key: &str, client_address: &str) {
        if let Some(queue) = self.blpop_subscribers.get_mut(key) {
            queue.retain(|subscriber| subscriber.client_address != client_address);

            if queue.is_empty() {
                self.blpop_subscribers.remove(key);
            }
        }
    }

    pub fn has_blpop_subscribers(&self, key: &str) -> bool {
        self.blpop_subscribers
            .get(key)
            .is_some_and(|queue| !queue.is_empty())
    }

    /// Hands `value` to the oldest waiter on `key` that is still listening.
    ///
    /// Returns the value back if nobody took it.
    pub fn send_to_blpop_subscriber(&mut self, key: &str, value: String) -> Option<String> {
        let Some(queue) = self.blpop_subscribers.get_mut(key) else {
            return Some(value);
        };

        let mut value = value;

        while let Some(subscriber) = queue.pop_front() {
            match subscriber.sender.send(value) {
                Ok(()) => {
                    if queue.is_empty() {
                        self.blpop_subscribers.remove(key);
                    }

                    return None;
                }
                // Receiver gave up (timed out or disconnected), try the next one.
                Err(returned) => value = returned,
            }
        }

        self.blpop_subscribers.remove(key);

        Some(value)
    }

    pub fn add_xread_subscriber(&mut self, key: String, subscriber: XreadSubscriber) {
        self.xread_subscribers
            .entry(key)
            .or_default()
            .push(subscriber);
    }

    pub fn remove_xread_subscriber(&mut self, key: &str, client_address: &str) {
        if let Some(subscribers) = self.xread_subscribers.get_mut(key) {
            subscribers.retain(|subscriber| subscriber.client_address != client_address);

            if subscribers.is_empty() {
                self.xread_subscribers.remove(key);
            }
        }
    }

    /// Wakes every reader blocked on `key`.
    pub fn notify_xread_subscribers(&mut self, key: &str) {
        if let Some(subscribers) = self.xread_subscribers.remove(key) {
            for subscriber in subscribers {
                let _ = subscriber.sender.try_send(());
            }
        }
    }

    pub fn start_transaction(&mut self, client_address: String) -> Result<(), StateError> {
        if self.transactions.contains_key(&client_address) {
            return Err(StateError::NestedMulti);
        }

        self.transactions.insert(client_address, Vec::new());

        Ok(())
    }

    pub fn get_transaction(&self, client_address: &str) -> Option<&Vec<CommandHandler>> {
        self.transactions.get(client_address)
    }

    pub fn add_to_transaction(
        &mut self,
        client_address: &str,
        command: CommandHandler,
    ) -> Result<(), StateError> {
        let Some(queue) = self.transactions.get_mut(client_address) else {
            return Err(StateError::TransactionNotStarted);
        };

        queue.push(command);

        Ok(())
    }

    pub fn remove_transaction(
        &mut self,
        client_address: &str,
    ) -> Result<Vec<CommandHandler>, StateError> {
        self.transactions
            .remove(client_address)
            .ok_or(StateError::TransactionNotStarted)
    }

    pub fn handshake_step(&self, client_address: &str) -> HandshakeStep {
        self.handshakes
            .get(client_address)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_handshake_step(&mut self, client_address: &str, step: HandshakeStep) {
        self.handshakes.insert(client_address.to_string(), step);
    }

    /// Forgets everything tied to a closed connection.
    pub fn remove_client(&mut self, client_address: &str) {
        self.transactions.remove(client_address);
        self.handshakes.remove(client_address);

        for queue in self.blpop_subscribers.values_mut() {
            queue.retain(|subscriber| subscriber.client_address != client_address);
        }
        self.blpop_subscribers.retain(|_, queue| !queue.is_empty());

        for subscribers in self.xread_subscribers.values_mut() {
            subscribers.retain(|subscriber| subscriber.client_address != client_address);
        }
        self.xread_subscribers
            .retain(|_, subscribers| !subscribers.is_empty());
    }
}
