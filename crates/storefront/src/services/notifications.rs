//! Best-effort order notifications over the Telegram bot.
//!
//! Messages are sent on a spawned task after the database work has
//! committed. A failed send is logged and never reaches the customer.

use kafsh_core::TelegramChatId;
use kafsh_core::locale::to_persian_digits;
use tracing::instrument;

use crate::config::StorefrontConfig;
use crate::models::Order;
use crate::telegram::{OpenAppButton, TelegramBotClient, escape_html};

/// Sends order messages to customers and the admin chat.
#[derive(Clone)]
pub struct Notifier {
    bot: Option<TelegramBotClient>,
    admin_chat_id: Option<TelegramChatId>,
    base_url: String,
    shop_name: String,
}

impl Notifier {
    /// Build from config. Returns a disabled notifier when notifications are
    /// switched off or the HTTP client cannot be built.
    #[must_use]
    pub fn from_config(config: &StorefrontConfig) -> Self {
        let bot = if config.telegram.notifications_enabled {
            TelegramBotClient::new(config.telegram.bot_token.clone())
                .inspect_err(|e| tracing::warn!(error = %e, "Telegram client unavailable"))
                .ok()
        } else {
            None
        };

        Self {
            bot,
            admin_chat_id: config.telegram.admin_chat_id,
            base_url: config.base_url.clone(),
            shop_name: config.shop.name.clone(),
        }
    }

    /// A notifier that never sends anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            bot: None,
            admin_chat_id: None,
            base_url: String::new(),
            shop_name: String::new(),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.bot.is_some()
    }

    /// Tell the customer and the admin chat about a new order.
    pub fn order_placed(&self, order: &Order) {
        let Some(bot) = self.bot.clone() else {
            return;
        };
        let customer_text = placed_message(&self.shop_name, order);
        let admin_text = admin_message(order);
        let order_url = format!("{}/orders/{}", self.base_url, order.tracking_code);
        let admin_url = format!("{}/admin/orders/{}", self.base_url, order.tracking_code);
        let customer = TelegramChatId::from(order.telegram_id);
        let admin_chat = self.admin_chat_id;

        tokio::spawn(async move {
            send(&bot, customer, &customer_text, "مشاهده سفارش", &order_url).await;
            if let Some(chat) = admin_chat {
                send(&bot, chat, &admin_text, "مدیریت سفارش", &admin_url).await;
            }
        });
    }

    /// Tell the customer their order moved to a new status.
    pub fn status_changed(&self, order: &Order) {
        let Some(bot) = self.bot.clone() else {
            return;
        };
        let text = status_message(&self.shop_name, order);
        let url = format!("{}/orders/{}", self.base_url, order.tracking_code);
        let customer = TelegramChatId::from(order.telegram_id);

        tokio::spawn(async move {
            send(&bot, customer, &text, "مشاهده سفارش", &url).await;
        });
    }
}

#[instrument(skip(bot, text, url), fields(chat_id = %chat_id))]
async fn send(
    bot: &TelegramBotClient,
    chat_id: TelegramChatId,
    text: &str,
    button: &str,
    url: &str,
) {
    let button = OpenAppButton { text: button, url };
    match bot.send_message(chat_id, text, Some(button)).await {
        Ok(()) => tracing::debug!("Notification sent"),
        Err(e) => tracing::warn!(error = %e, "Notification failed"),
    }
}

fn placed_message(shop_name: &str, order: &Order) -> String {
    format!(
        "<b>{}</b>\nسفارش شما ثبت شد.\n\nکد پیگیری: <code>{}</code>\nتعداد: {} جفت\nمبلغ کل: {}\n\nپس از تایید، وضعیت سفارش را به شما اطلاع می‌دهیم.",
        escape_html(shop_name),
        order.tracking_code,
        to_persian_digits(&order.item_count().to_string()),
        order.total.display_fa(),
    )
}

fn status_message(shop_name: &str, order: &Order) -> String {
    format!(
        "<b>{}</b>\nوضعیت سفارش <code>{}</code>: <b>{}</b>",
        escape_html(shop_name),
        order.tracking_code,
        order.status.label_fa(),
    )
}

fn admin_message(order: &Order) -> String {
    let mut text = format!(
        "🛒 سفارش جدید <code>{}</code>\n{} - {}\n{}، {}\n",
        order.tracking_code,
        escape_html(&order.shipping.recipient_name),
        order.shipping.phone,
        escape_html(&order.shipping.province),
        escape_html(&order.shipping.city),
    );
    for item in &order.items {
        text.push_str(&format!(
            "\n• {} / {} / سایز {} × {}",
            escape_html(&item.product_name),
            escape_html(&item.color_name),
            escape_html(&item.size_label),
            to_persian_digits(&item.quantity.to_string()),
        ));
    }
    text.push_str(&format!("\n\nمبلغ کل: {}", order.total.display_fa()));
    text
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use kafsh_core::{
        OrderId, OrderItemId, OrderStatus, PhoneNumber, PostalCode, Price, ProductId, SizeId,
        TelegramUserId, TrackingCode, UserId, VariantId,
    };

    use super::*;
    use crate::models::{OrderItem, ShippingInfo};

    fn order() -> Order {
        let price = Price::from_toman(1_250_000).unwrap();
        Order {
            id: OrderId::new(1),
            tracking_code: TrackingCode::parse("KF-7Q2M9XHD").unwrap(),
            user_id: UserId::new(1),
            telegram_id: TelegramUserId::new(42),
            status: OrderStatus::Shipped,
            shipping: ShippingInfo {
                recipient_name: "<script>".to_string(),
                phone: PhoneNumber::parse("09123456789").unwrap(),
                province: "تهران".to_string(),
                city: "تهران".to_string(),
                address: "خیابان آزادی".to_string(),
                postal_code: PostalCode::parse("1234567890").unwrap(),
                note: None,
            },
            subtotal: price,
            shipping_cost: Price::ZERO,
            total: price,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                product_id: ProductId::new(1),
                variant_id: VariantId::new(1),
                size_id: SizeId::new(1),
                product_name: "کتانی".to_string(),
                color_name: "سفید".to_string(),
                size_label: "41".to_string(),
                unit_price: price,
                quantity: 1,
                line_total: price,
            }],
        }
    }

    #[test]
    fn test_placed_message() {
        let text = placed_message("کفش", &order());
        assert!(text.contains("KF-7Q2M9XHD"));
        assert!(text.contains(&order().total.display_fa()));
    }

    #[test]
    fn test_status_message_uses_persian_label() {
        let text = status_message("کفش", &order());
        assert!(text.contains(OrderStatus::Shipped.label_fa()));
    }

    #[test]
    fn test_admin_message_escapes_customer_input() {
        let text = admin_message(&order());
        assert!(text.contains("&lt;script&gt;"));
        assert!(!text.contains("<script>"));
        assert!(text.contains("سایز 41"));
    }

    #[test]
    fn test_disabled_notifier_is_noop() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        notifier.order_placed(&order());
    }
}
