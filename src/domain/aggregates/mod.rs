//! Aggregates module
pub mod cart;
pub mod order;
pub mod product;
pub mod timeline;
pub mod voucher;

pub use cart::{Cart, CartError, CartLine, CartOwner};
pub use order::{Address, DeliveryChange, NewOrder, Order, OrderError, OrderLine, Payment, PaymentMethod, PaymentStatus, Pricing, ShippingSnapshot, TrackingStep};
pub use product::{Product, ProductError, Purchasable, Variant};
pub use timeline::{DeliveryStatus, EventStatus, Stage, Timeline, TimelineEvent};
pub use voucher::{DiscountType, Voucher, VoucherRejection};
