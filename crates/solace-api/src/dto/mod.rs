//! Request and response DTOs for the HTTP API

pub mod common;
pub mod payment;
pub mod session;
pub mod wallet;

pub use common::ApiResponse;
pub use payment::{CreateOrderRequest, CreditResponse, OrderResponse, VerifyPaymentRequest};
pub use session::{
    CloseChatRequest, DeductChatRequest, DeductChatResponse, FinalizeCallRequest,
    FinalizeCallResponse, FreeMessageRequest, FreeMessageResponse, RoomTokenRequest,
    RoomTokenResponse,
};
pub use wallet::{PlanView, WalletResponse};
