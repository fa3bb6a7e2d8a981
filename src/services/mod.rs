pub mod activation;
pub mod auth_service;
pub mod certificate;
pub mod course_service;
pub mod currency;
pub mod email_service;
pub mod enrollment_service;
pub mod installment_service;
pub mod payment_service;
pub mod project_service;
