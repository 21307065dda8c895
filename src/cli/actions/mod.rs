use secrecy::SecretString;

pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        jwt_secret: SecretString,
        frontend_url: String,
        apple_bundle_id: Option<String>,
        resend_api_key: Option<SecretString>,
        email_from: String,
    },
}
