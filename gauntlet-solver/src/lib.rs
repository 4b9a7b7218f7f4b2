//! Solver capability: delegate an anti-bot challenge to an external solving
//! service and get back a proof token.
//!
//! The core consumes the [`traits::CaptchaSolver`] trait; the concrete
//! [`two_captcha::TwoCaptchaClient`] speaks the 2captcha-style submit/poll
//! HTTP protocol. The solving algorithm itself is a black box on the other
//! side of the wire.

pub mod traits;
pub mod two_captcha;

pub use traits::CaptchaSolver;
pub use two_captcha::TwoCaptchaClient;
