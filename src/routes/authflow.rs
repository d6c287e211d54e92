use {
    crate::{
        config::Config,
        date_helpers::{relative_to_absolute, timepoint_expired},
        routes::{FlashView, FormOutcome},
        server_error,
        session::{check_access, Access, Denial, Session},
        sql_interface::{
            self, NewProfile, ProfileCreationError, Role, SearchProfileBy, SearchProfileError,
        },
        validation::{self, FieldErrors},
        RallyDbConn,
    },
    argon2::{
        password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
        Algorithm, Argon2, Params, Version,
    },
    base64ct::{Base64UrlUnpadded, Encoding},
    cookie::SameSite,
    jwt::{SignWithKey, VerifyWithKey},
    lettre::{message::Mailbox, transport::smtp::authentication::Credentials, AsyncTransport},
    rand::Rng,
    rocket::{
        form::{Form, Strict},
        http::{Cookie, CookieJar, Status},
        request::{FlashMessage, FromRequest, Outcome, Request},
        response::{Flash, Redirect},
        Route, State,
    },
    rocket_dyn_templates::{context, Template},
    serde::{Deserialize, Serialize},
    std::time::Duration,
    thiserror::Error,
};

const AUTH_COOKIE: &str = "auth-token";

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![index, sign_in, sign_up, confirm_email, sign_out]
}

#[derive(Debug, FromForm)]
pub struct SignInForm {
    email: String,
    password: String,
}

#[derive(Debug, Default, Clone, Serialize, FromForm)]
pub struct SignUpForm {
    first_name: String,
    last_name: String,
    email: String,
    #[serde(skip_serializing)]
    password: String,
}

impl SignUpForm {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check("first_name", validation::name(&self.first_name));
        errors.check("last_name", validation::name(&self.last_name));
        errors.check("email", validation::email(&self.email));
        errors.check("password", validation::password(&self.password));
        errors
    }
}

fn auth_page(
    flash: Option<FlashMessage<'_>>,
    sign_up: &SignUpForm,
    sign_up_errors: &FieldErrors,
) -> Template {
    Template::render(
        "auth",
        context! {
            flash: FlashView::from_flash(flash),
            sign_up,
            sign_up_errors,
        },
    )
}

#[get("/auth")]
pub fn index(
    flash: Option<FlashMessage<'_>>,
    session: Option<Session>,
) -> Result<Template, Redirect> {
    if session.is_some() {
        return Err(Redirect::to("/"));
    }
    Ok(auth_page(flash, &SignUpForm::default(), &FieldErrors::new()))
}

/// Generates a token with 128 random bytes, constant-time encoded in URL-safe base64. Also returns
/// the random bytes used.
fn generate_token() -> ([u8; 128], String) {
    let mut rng = rand::thread_rng();
    let mut bytes = [0_u8; 128];

    rng.fill(&mut bytes);

    (bytes, Base64UrlUnpadded::encode_string(&bytes))
}

#[derive(Error, Debug)]
enum SendMailError {
    #[error("SMTP error sending mail: {0}")]
    LettreError(#[from] lettre::transport::smtp::Error),
    #[error("Error while building email: {0}")]
    BuildError(#[from] lettre::error::Error),
}

/// Sends the mail with the email confirmation link using the given credentials and mail server.
async fn send_confirmation_mail(
    url: &str,
    from: lettre::Address,
    to: lettre::Address,
    password: &str,
    smtp_server: &str,
) -> Result<(), SendMailError> {
    let email = lettre::Message::builder()
        .from(Mailbox::new(Some("RallyEngage".to_string()), from.clone()))
        .to(Mailbox::new(None, to))
        .subject("[RallyEngage] Confirm your email address")
        .body(format!(
            r#"Hello,

thanks for signing up to RallyEngage. Please confirm your email address by
following this link within the next 24 hours:

{url}

Afterwards you can sign in and register your crew for upcoming rallies.

See you on the stages,
RallyEngage

(P.S. Didn't sign up? Then somebody else used your address. Just ignore this
 mail, the account stays locked.)"#,
        ))?;

    let creds = Credentials::new(from.to_string(), password.to_string());
    let conn = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(smtp_server)?
        .credentials(creds)
        .build();

    conn.send(email).await?;
    Ok(())
}

// Constructs an [`argon2::Argon2`] instance with reasonable settings.
fn construct_argon2_instance() -> Result<Argon2<'static>, argon2::Error> {
    Ok(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(15_u32 * 1024_u32, 2, 1, None)?,
    ))
}

pub(crate) fn hash_secret(secret: &[u8]) -> Result<String, String> {
    let salt = SaltString::generate(rand::thread_rng());
    let argon2 = construct_argon2_instance().map_err(|err| err.to_string())?;
    argon2
        .hash_password(secret, &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| err.to_string())
}

fn verify_secret(secret: &[u8], stored_hash: &str) -> Result<bool, String> {
    let argon2 = construct_argon2_instance().map_err(|err| err.to_string())?;
    let hash = PasswordHash::new(stored_hash).map_err(|err| err.to_string())?;
    Ok(argon2.verify_password(secret, &hash).is_ok())
}

/// Why a sign-in attempt failed, as far as the user may know.
#[derive(Debug, Error)]
pub enum SignInError {
    #[error("Email not confirmed")]
    EmailNotConfirmed,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Server side failure: {0}")]
    Other(String),
}

impl SignInError {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            SignInError::EmailNotConfirmed => {
                "Please confirm your email address first, we sent you a link when you signed up."
            }
            SignInError::InvalidCredentials => "Invalid email or password.",
            SignInError::Other(_) => "Signing in failed, please try again later.",
        }
    }
}

impl From<SearchProfileError> for SignInError {
    fn from(source: SearchProfileError) -> Self {
        match source {
            SearchProfileError::NotFound => SignInError::InvalidCredentials,
            SearchProfileError::RusqliteError(err) => SignInError::Other(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
    sub: i64,
}

impl Claims {
    fn expired(&self) -> bool {
        timepoint_expired(self.exp)
    }

    fn try_from_request(req: &Request<'_>) -> Result<Self, AuthError> {
        let config = req
            .rocket()
            .state::<Config>()
            .ok_or(AuthError::ConfigMissing)?;
        let cookies = req.cookies();
        let claims: Claims = cookies
            .get(AUTH_COOKIE)
            .ok_or(AuthError::CookieNotFound)?
            .value()
            .verify_with_key(&config.jwt_key)?;

        if claims.expired() {
            cookies.remove(AUTH_COOKIE);
            return Err(AuthError::JwtExpired);
        }

        Ok(claims)
    }
}

#[post("/auth/signin", data = "<credentials>")]
pub async fn sign_in(
    conn: RallyDbConn,
    jar: &CookieJar<'_>,
    config: &State<Config>,
    credentials: Form<Strict<SignInForm>>,
) -> Flash<Redirect> {
    let email = credentials.email.trim().to_lowercase();
    let password = credentials.password.clone();

    let profile = match conn
        .run(move |c| sql_interface::search_profile(c, &SearchProfileBy::Email(email)))
        .await
        .map_err(SignInError::from)
        .and_then(|profile| {
            let matches = verify_secret(password.as_bytes(), &profile.password_hash)
                .map_err(SignInError::Other)?;
            if !matches {
                Err(SignInError::InvalidCredentials)
            } else if !profile.email_confirmed {
                Err(SignInError::EmailNotConfirmed)
            } else {
                Ok(profile)
            }
        }) {
        Ok(profile) => profile,
        Err(err) => {
            if let SignInError::Other(detail) = &err {
                log::error!("Error while signing in: {detail}");
            }
            return Flash::error(Redirect::to(uri!(index)), err.user_message());
        }
    };

    // generate a JWT and store it in a cookie
    let claims = Claims {
        exp: relative_to_absolute(Duration::from_secs(
            60 * 60 * 24 * u64::from(config.session_days),
        )),
        sub: profile.id,
    };
    let jwt = match claims.sign_with_key(&config.jwt_key) {
        Ok(jwt) => jwt,
        Err(err) => {
            return server_error(
                format!("Could not sign JWT: {err}"),
                "an error occured while signing you in",
            )
        }
    };
    jar.add(
        Cookie::build((AUTH_COOKIE, jwt))
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(i64::from(config.session_days))),
    );

    let target = match profile.role {
        Role::Admin => "/admin",
        Role::Organizer => "/organizer",
        Role::Driver => "/",
    };
    Flash::success(
        Redirect::to(target),
        format!("Welcome back, {}!", profile.first_name),
    )
}

#[post("/auth/signup", data = "<form>")]
pub async fn sign_up(
    conn: RallyDbConn,
    config: &State<Config>,
    form: Form<SignUpForm>,
) -> FormOutcome {
    let mut form = form.into_inner();
    form.email = form.email.trim().to_lowercase();
    form.first_name = form.first_name.trim().to_string();
    form.last_name = form.last_name.trim().to_string();

    let errors = form.validate();
    let email: lettre::Address = match form.email.parse() {
        Ok(email) if errors.is_empty() => email,
        _ => return FormOutcome::Invalid(auth_page(None, &form, &errors)),
    };

    let password_hash = match hash_secret(form.password.as_bytes()) {
        Ok(hash) => hash,
        Err(err) => {
            return FormOutcome::Saved(server_error(
                format!("Could not hash password: {err}"),
                "an error occured while creating your account",
            ))
        }
    };
    let new_profile = NewProfile {
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        email: email.clone(),
        password_hash,
        role: Role::Driver,
    };
    let profile_id = match conn
        .run(move |c| sql_interface::sign_up_profile(c, &new_profile))
        .await
    {
        Ok(id) => id,
        Err(ProfileCreationError::EmailAlreadyInUse) => {
            let mut errors = FieldErrors::new();
            errors.add("email", "this email address is already registered");
            return FormOutcome::Invalid(auth_page(None, &form, &errors));
        }
        Err(err) => {
            return FormOutcome::Saved(server_error(
                format!("Error while inserting profile: {err}"),
                "an error occured while creating your account",
            ))
        }
    };

    let (raw_token, encoded_token) = generate_token();
    let url = format!(
        "{}{}",
        config.public_url.trim_end_matches('/'),
        uri!(confirm_email(token = encoded_token, profile_id = profile_id)),
    );

    match send_confirmation_mail(
        &url,
        config.email.clone(),
        email,
        &config.email_creds,
        &config.smtp_server,
    )
    .await
    {
        Err(SendMailError::LettreError(err)) => {
            let logmsg = if err.is_permanent() {
                format!("Permanent SMTP error while sending email: {err}")
            } else if err.is_transient() {
                format!("Transient SMTP error while sending email: {err}")
            } else {
                format!("Error occured while trying to send email: {err}")
            };
            return FormOutcome::Saved(server_error(
                logmsg,
                "the confirmation mail could not be sent, please sign up again later",
            ));
        }
        Err(SendMailError::BuildError(err)) => {
            return FormOutcome::Saved(server_error(
                format!("Could not build confirmation mail: {err}"),
                "the confirmation mail could not be sent, please sign up again later",
            ))
        }
        Ok(()) => (),
    };

    let hashed_token = match hash_secret(&raw_token) {
        Ok(hash) => hash,
        Err(err) => {
            return FormOutcome::Saved(server_error(
                format!("Could not hash token: {err}"),
                "an error occured while storing the confirmation token",
            ))
        }
    };
    if let Err(err) = conn
        .run(move |c| sql_interface::update_token(c, profile_id, Some(hashed_token)))
        .await
    {
        return FormOutcome::Saved(server_error(
            format!("Database error while updating token: {err}"),
            "an error occured while storing the confirmation token",
        ));
    };

    FormOutcome::Saved(Flash::success(
        Redirect::to(uri!(index)),
        "Account created. Follow the link we sent you by email to confirm your address.",
    ))
}

fn confirm_failure_flash() -> Flash<Redirect> {
    Flash::error(
        Redirect::to(uri!(index)),
        "Invalid or expired confirmation link. Please sign up again or contact the organizers.",
    )
}

#[get("/auth/confirm/<token>?<profile_id>")]
pub async fn confirm_email(conn: RallyDbConn, token: String, profile_id: i64) -> Flash<Redirect> {
    // first, find the profile (which contains the token hash) in the DB
    let profile = match conn
        .run(move |c| sql_interface::search_profile(c, &SearchProfileBy::Id(profile_id)))
        .await
    {
        Err(SearchProfileError::NotFound) => return confirm_failure_flash(),
        Err(err) => {
            log::error!("Database error while searching profile {profile_id}: {err}");
            return confirm_failure_flash();
        }
        Ok(profile) => profile,
    };

    // second, check if the token expired
    let Some(expiration) = profile.token_expiration else {
        return confirm_failure_flash();
    };
    if timepoint_expired(expiration) {
        return confirm_failure_flash();
    }
    let Some(db_token) = profile.token else {
        return confirm_failure_flash();
    };
    // possibly evil client, but we just friendly say "something happened"
    let Ok(client_token_bytes) = Base64UrlUnpadded::decode_vec(&token) else {
        return confirm_failure_flash();
    };

    // third, verify client token with token hash we got above
    match verify_secret(&client_token_bytes, &db_token) {
        Ok(true) => (),
        Ok(false) => return confirm_failure_flash(),
        Err(err) => {
            log::error!("Invalid token hash in DB for profile {profile_id}: {err}");
            return confirm_failure_flash();
        }
    }

    if let Err(err) = conn
        .run(move |c| sql_interface::confirm_email(c, profile_id))
        .await
    {
        return server_error(
            format!("Error while confirming email of profile {profile_id}: {err}"),
            "an error occured while confirming your email address",
        );
    }

    Flash::success(
        Redirect::to(uri!(index)),
        "Email address confirmed, you can sign in now.",
    )
}

#[post("/auth/signout")]
pub fn sign_out(jar: &CookieJar<'_>) -> Flash<Redirect> {
    jar.remove(AUTH_COOKIE);
    Flash::success(Redirect::to("/"), "Signed out.")
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT cookie doesn't exist")]
    CookieNotFound,
    #[error("JWT verification error")]
    JwtVerificationError(#[from] jwt::error::Error),
    #[error("JWT cookie expired")]
    JwtExpired,
    #[error("Profile doesn't exist")]
    NonExistentProfile,
    #[error("Configuration is not managed")]
    ConfigMissing,
    #[error("Database fairing is not attached")]
    DatabaseMissing,
    #[error("Server side database failure: {0}")]
    ServerDBFailure(#[from] rusqlite::Error),
}

impl From<SearchProfileError> for AuthError {
    fn from(source: SearchProfileError) -> Self {
        match source {
            SearchProfileError::NotFound => AuthError::NonExistentProfile,
            SearchProfileError::RusqliteError(err) => AuthError::ServerDBFailure(err),
        }
    }
}

impl AuthError {
    /// Whether the visitor simply isn't signed in, as opposed to the server failing.
    fn is_anonymous(&self) -> bool {
        matches!(
            self,
            AuthError::CookieNotFound
                | AuthError::JwtVerificationError(_)
                | AuthError::JwtExpired
                | AuthError::NonExistentProfile
        )
    }
}

/// The outcome of resolving the session, cached for the lifetime of one request.
enum ResolvedSession {
    Active(Session),
    Anonymous,
    Broken,
}

async fn resolve_session(req: &Request<'_>) -> Result<Session, AuthError> {
    let claims = Claims::try_from_request(req)?;

    // the role might have changed since signing in, so it's always looked up
    let conn = RallyDbConn::get_one(req.rocket())
        .await
        .ok_or(AuthError::DatabaseMissing)?;
    let profile_id = claims.sub;
    let profile = conn
        .run(move |c| sql_interface::search_profile(c, &SearchProfileBy::Id(profile_id)))
        .await?;

    Ok(Session::from(&profile))
}

#[async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Denial;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let resolved = req
            .local_cache_async(async {
                match resolve_session(req).await {
                    Ok(session) => ResolvedSession::Active(session),
                    Err(err) if err.is_anonymous() => ResolvedSession::Anonymous,
                    Err(err) => {
                        log::error!("Could not resolve session: {err}");
                        ResolvedSession::Broken
                    }
                }
            })
            .await;

        match resolved {
            ResolvedSession::Active(session) => Outcome::Success(session.clone()),
            ResolvedSession::Anonymous => {
                Outcome::Error((Status::Unauthorized, Denial::LoginRequired))
            }
            ResolvedSession::Broken => {
                Outcome::Error((Status::InternalServerError, Denial::LoginRequired))
            }
        }
    }
}

/// Resolves the session and checks it against what the route requires.
async fn session_with(req: &Request<'_>, access: Access) -> Outcome<Session, Denial> {
    match req.guard::<Session>().await {
        Outcome::Success(session) => match check_access(Some(&session), access) {
            Ok(()) => Outcome::Success(session),
            Err(denial) => Outcome::Error((Status::Forbidden, denial)),
        },
        Outcome::Error(err) => Outcome::Error(err),
        Outcome::Forward(status) => Outcome::Forward(status),
    }
}

/// A signed-in organizer or admin. Having this in scope means the dashboards may be shown.
pub struct Organizer(pub Session);

#[async_trait]
impl<'r> FromRequest<'r> for Organizer {
    type Error = Denial;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        session_with(req, Access::Organizer).await.map(Organizer)
    }
}

/// A signed-in admin, who may additionally manage roles.
pub struct Admin(pub Session);

#[async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = Denial;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        session_with(req, Access::Admin).await.map(Admin)
    }
}
