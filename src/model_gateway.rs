use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;

use crate::config::Config;
use crate::model::Message;
use crate::providers;

pub type ModelGatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + 'a>>;

pub trait ModelGateway {
    fn chat<'a>(&'a self, messages: &'a [Message]) -> ModelGatewayFuture<'a>;
}

pub struct HttpModelGateway<'a> {
    client: &'a Client,
    cfg: &'a Config,
}

impl<'a> HttpModelGateway<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        Self { client, cfg }
    }
}

impl ModelGateway for HttpModelGateway<'_> {
    fn chat<'b>(&'b self, messages: &'b [Message]) -> ModelGatewayFuture<'b> {
        Box::pin(providers::openai::chat(self.client, self.cfg, messages))
    }
}
