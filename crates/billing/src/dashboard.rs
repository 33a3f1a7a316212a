//! Stripe dashboard links for log lines

const DASHBOARD_BASE_URL: &str = "https://dashboard.stripe.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardObject {
    CheckoutSession,
    PaymentLink,
    Subscription,
    Refund,
    Charge,
    Invoice,
}

impl DashboardObject {
    fn path(&self) -> &'static str {
        match self {
            DashboardObject::CheckoutSession => "checkout/sessions",
            DashboardObject::PaymentLink => "payment_links",
            DashboardObject::Subscription => "subscriptions",
            DashboardObject::Refund => "refunds",
            DashboardObject::Charge => "charges",
            DashboardObject::Invoice => "invoices",
        }
    }
}

pub fn dashboard_url(object: DashboardObject, id: &str) -> String {
    format!("{}/{}/{}", DASHBOARD_BASE_URL, object.path(), id)
}
