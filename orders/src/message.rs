use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::db::Order;

/// Language of a customer-facing notification, picked from the record's locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLanguage {
    English,
    Russian,
}

impl MessageLanguage {
    /// `en*` locales get English; everything else gets Russian.
    pub fn from_locale(locale: &str) -> Self {
        if locale.to_ascii_lowercase().starts_with("en") {
            MessageLanguage::English
        } else {
            MessageLanguage::Russian
        }
    }
}

/// The customer's IANA zone, or UTC when the stored name is not one.
pub fn customer_zone(order: &Order) -> Tz {
    match order.timezone.parse::<Tz>() {
        Ok(tz) => tz,
        Err(e) => {
            warn!(order_id = order.id, timezone = order.timezone, error = %e, "unknown timezone, using UTC");
            Tz::UTC
        }
    }
}

/// Render the "your order has arrived" notification for `order`, stamped in
/// the customer's local time.
pub fn compose_message(order: &Order, now: DateTime<Utc>) -> String {
    let timestamp = now
        .with_timezone(&customer_zone(order))
        .format("%d/%m/%Y %H:%M:%S %Z");
    let model = order.model.as_deref().unwrap_or("-");

    match MessageLanguage::from_locale(&order.locale) {
        MessageLanguage::English => format!(
            "Hello, {first_name}!\n\n\
             As of {timestamp}, your order `{id}` has arrived to our base.\n\
             We are going to deliver it to your address _{address}_ no later than in 3 days.\n\n\
             *Product Details:*\n\
             Product: {product}\n\
             Model: {model}\n\
             Price: €{price:.2}\n\
             Amount: {amount}\n\
             Weight: {weight:.3} kg\n\
             ID: {id}",
            first_name = order.first_name,
            id = order.id,
            address = order.address,
            product = order.product,
            price = order.price,
            amount = order.amount,
            weight = order.weight,
        ),
        MessageLanguage::Russian => format!(
            "Здравствуйте, {first_name}!\n\n\
             {timestamp} Ваш заказ `{id}` доставлен в наш центр.\n\
             Мы доставим его по Вашему адресу _{address}_ не позже, чем через 3 дня.\n\n\
             *Детали заказа:*\n\
             Товар: {product}\n\
             Модель: {model}\n\
             Цена: €{price:.2}\n\
             Количество: {amount}\n\
             Вес: {weight:.3} кг\n\
             ID: {id}",
            first_name = order.first_name,
            id = order.id,
            address = order.address,
            product = order.product,
            price = order.price,
            amount = order.amount,
            weight = order.weight,
        ),
    }
}
