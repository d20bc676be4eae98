use anyhow::Context;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn key_id(&self) -> &str;

    async fn create_order(&self, amount: i64, currency: &str, receipt: &str, notes: Value) -> anyhow::Result<String>;

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    mac.verify_slice(&expected).is_ok()
}

pub struct Razorpay {
    key_id: String,
    key_secret: String,
    http: reqwest::Client,
}

impl Razorpay {
    const ORDERS_URL: &'static str = "https://api.razorpay.com/v1/orders";

    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
}

#[async_trait]
impl PaymentGateway for Razorpay {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, amount: i64, currency: &str, receipt: &str, notes: Value) -> anyhow::Result<String> {
        let order: OrderResponse = self.http
            .post(Self::ORDERS_URL)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
                "notes": notes,
            }))
            .send()
            .await?
            .error_for_status()
            .context("razorpay rejected order")?
            .json()
            .await?;
        Ok(order.id)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify(&self.key_secret, order_id, payment_id, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_bind_order_and_payment() {
        let signature = sign("secret", "order_1", "pay_1");
        assert_eq!(signature.len(), 64);
        assert!(verify("secret", "order_1", "pay_1", &signature));
        assert!(!verify("secret", "order_1", "pay_2", &signature));
        assert!(!verify("other", "order_1", "pay_1", &signature));
        assert!(!verify("secret", "order_1", "pay_1", "not-hex"));
    }

    #[test]
    fn gateway_uses_its_secret() {
        let gateway = Razorpay::new("rzp_test", "shh");
        let signature = sign("shh", "o", "p");
        assert!(gateway.verify_signature("o", "p", &signature));
        assert_eq!(gateway.key_id(), "rzp_test");
    }
}
