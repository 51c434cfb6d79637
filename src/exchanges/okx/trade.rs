use crate::core::errors::ExchangeError;
use crate::exchanges::okx::client::ClientWs;
use crate::exchanges::okx::connection::ConnectionClass;
use crate::exchanges::okx::types::{
    to_args, Args, OkxAmendRequest, OkxCancelRequest, OkxOrderRequest, Operation,
};
use serde::Serialize;

/// Order entry over the private WebSocket connection
///
/// Each call is correlated by `id`; the acknowledgement arrives on the
/// success sink, or on the error sink when its code is non-zero.
#[derive(Clone)]
pub struct Trade {
    client: ClientWs,
}

impl Trade {
    pub(crate) const fn new(client: ClientWs) -> Self {
        Self { client }
    }

    pub async fn place_order(&self, id: &str, order: &OkxOrderRequest) -> Result<(), ExchangeError> {
        self.submit(Operation::Order, id, std::slice::from_ref(order))
            .await
    }

    pub async fn place_multiple_orders(
        &self,
        id: &str,
        orders: &[OkxOrderRequest],
    ) -> Result<(), ExchangeError> {
        self.submit(Operation::BatchOrders, id, orders).await
    }

    pub async fn cancel_order(
        &self,
        id: &str,
        cancel: &OkxCancelRequest,
    ) -> Result<(), ExchangeError> {
        self.submit(Operation::CancelOrder, id, std::slice::from_ref(cancel))
            .await
    }

    pub async fn cancel_multiple_orders(
        &self,
        id: &str,
        cancels: &[OkxCancelRequest],
    ) -> Result<(), ExchangeError> {
        self.submit(Operation::BatchCancelOrders, id, cancels).await
    }

    pub async fn amend_order(&self, id: &str, amend: &OkxAmendRequest) -> Result<(), ExchangeError> {
        self.submit(Operation::AmendOrder, id, std::slice::from_ref(amend))
            .await
    }

    pub async fn amend_multiple_orders(
        &self,
        id: &str,
        amends: &[OkxAmendRequest],
    ) -> Result<(), ExchangeError> {
        self.submit(Operation::BatchAmendOrders, id, amends).await
    }

    async fn submit<T: Serialize>(
        &self,
        op: Operation,
        id: &str,
        requests: &[T],
    ) -> Result<(), ExchangeError> {
        if id.is_empty() {
            return Err(ExchangeError::InvalidParameters(format!(
                "{op} requires a correlation id"
            )));
        }

        let args = requests.iter().map(to_args).collect::<Result<Vec<_>, _>>()?;
        let extras = Args::from([("id".to_string(), id.to_string())]);
        self.client
            .send(ConnectionClass::Private, op, args, Some(&extras))
            .await
    }
}

impl ClientWs {
    /// Order entry handle sharing this client's connections
    pub fn trade(&self) -> Trade {
        Trade::new(self.clone())
    }
}
