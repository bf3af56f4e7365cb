pub mod address;
pub mod cart;
pub mod checkout_order;
pub mod payment_method;
pub mod promotion;
pub mod shipping_zone;

pub use address::Address;
pub use cart::{Cart, CartItem};
pub use checkout_order::{OrderStatus, OrderSubmission, OrderTotals, PaymentStatus, PlacedOrder};
pub use payment_method::{CodConfig, PaymentMethod, PaymentMethodKind};
pub use promotion::{DiscountType, PromoCode};
pub use shipping_zone::{DeliveryDays, DeliveryEstimate, RegionPrefix, ShippingZone};
