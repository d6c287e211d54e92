use {
    base64ct::{Base64, Encoding, Error},
    hmac::{Hmac, NewMac},
    rocket::serde::{de, Deserialize},
    sha2::Sha256,
    std::fmt,
};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// The email from which confirmation mails will be sent.
    pub email: lettre::Address,

    /// Password for the email.
    pub email_creds: String,

    /// The key used for JWT signing. Should be base64 decodable.
    #[serde(deserialize_with = "deserialize_base64_to_hmac")]
    pub jwt_key: Hmac<Sha256>,

    /// The SMTP server which the email belongs to.
    pub smtp_server: String,

    /// Base URL put in front of links in mails, e.g. `https://rally.example.org`.
    pub public_url: String,

    /// Access token of the map tile provider. Maps render an error panel instead if unset.
    #[serde(default)]
    pub map_access_token: Option<String>,

    /// How many days a sign-in stays valid.
    #[serde(default = "default_session_days")]
    pub session_days: u32,
}

fn default_session_days() -> u32 {
    30
}

/// Deserializes standard base64 in constant time into an HMAC key.
fn deserialize_base64_to_hmac<'de, D: de::Deserializer<'de>>(
    de: D,
) -> Result<Hmac<Sha256>, D::Error> {
    use de::Unexpected::Str;

    struct Visitor;

    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Hmac<Sha256>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("padded base64 string")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            let bytes = Base64::decode_vec(value).map_err(|err| match err {
                Error::InvalidEncoding => E::invalid_value(Str(value), &"a base64 string"),
                Error::InvalidLength => E::invalid_length(value.len(), &"a padded base64 string"),
            })?;
            self.visit_bytes(&bytes)
        }

        fn visit_bytes<E: de::Error>(self, value: &[u8]) -> Result<Self::Value, E> {
            // HMAC accepts keys of any length
            Hmac::new_from_slice(value).map_err(|_| E::custom("invalid HMAC key length"))
        }
    }

    de.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::Config;
    use figment::{providers::Serialized, Figment};

    #[test]
    fn defaults_apply() {
        let config: Config = Figment::new()
            .merge(Serialized::default("email", "no-reply@example.org"))
            .merge(Serialized::default("email_creds", ""))
            .merge(Serialized::default("jwt_key", "c2VjcmV0LWtleQ=="))
            .merge(Serialized::default("smtp_server", "localhost"))
            .merge(Serialized::default("public_url", "http://localhost:8000"))
            .extract()
            .unwrap();

        assert_eq!(config.session_days, 30);
        assert!(config.map_access_token.is_none());
        assert_eq!(config.email.to_string(), "no-reply@example.org");
    }

    #[test]
    fn rejects_non_base64_key() {
        let result: Result<Config, _> = Figment::new()
            .merge(Serialized::default("email", "no-reply@example.org"))
            .merge(Serialized::default("email_creds", ""))
            .merge(Serialized::default("jwt_key", "not base64!"))
            .merge(Serialized::default("smtp_server", "localhost"))
            .merge(Serialized::default("public_url", "http://localhost:8000"))
            .extract();

        assert!(result.is_err());
    }
}
