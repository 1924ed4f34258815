pub mod booking;
pub mod church;
pub mod event;
pub mod gateway;

pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use church::{Church, ServiceOffering};
pub use event::{BookingLifecycleEvent, DomainEvent, PaymentConfirmedEvent};
pub use gateway::{CreatedOrder, GatewayCapture, OrderRequest, WebhookEvent, WebhookKind};
