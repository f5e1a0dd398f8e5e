//! Interactive connection test and login for the user account.

use crate::{
    config::{Config, Credentials},
    domain::Account,
    ports::{Prompt, SessionPort, SignIn},
    Error, Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// API_ID / API_HASH / PHONE_NUMBER are not all set; nothing was attempted.
    MissingCredentials,
    AlreadyAuthorized(Account),
    SignedIn(Account),
}

/// Check the connection and sign in if the saved session is not authorized yet.
pub async fn login(
    cfg: &Config,
    session: &dyn SessionPort,
    prompt: &dyn Prompt,
) -> Result<LoginOutcome> {
    let Some(creds) = cfg.credentials() else {
        print_setup_instructions();
        return Ok(LoginOutcome::MissingCredentials);
    };

    println!("🔄 Testing Telegram connection...");
    println!("Using phone number: {}", creds.phone);
    println!("📡 Connecting to Telegram...");

    let result = match session.connect().await {
        Ok(()) => authorize(&creds, session, prompt).await,
        Err(e) => Err(e),
    };

    session.disconnect().await;
    println!("🔌 Disconnected from Telegram");

    match result {
        Ok(outcome) => {
            println!();
            println!("🎉 Success! Your credentials work fine.");
            println!("🚀 You're ready to parse Telegram chats!");
            Ok(outcome)
        }
        Err(e) => {
            println!("❌ Error: {e}");
            print_common_issues();
            Err(e)
        }
    }
}

async fn authorize(
    creds: &Credentials,
    session: &dyn SessionPort,
    prompt: &dyn Prompt,
) -> Result<LoginOutcome> {
    if session.is_authorized().await? {
        println!("✅ Already logged in!");
        let me = session.me().await?;
        print_account(&me);
        return Ok(LoginOutcome::AlreadyAuthorized(me));
    }

    println!("🔐 Authentication required...");
    println!("📲 Sending verification code to your phone...");
    session.request_login_code(&creds.phone).await?;

    let code = prompt
        .ask("📱 Enter the verification code from Telegram: ")
        .await?;
    if code.is_empty() {
        return Err(Error::Auth("no verification code entered".to_string()));
    }

    let account = match session.sign_in(&code).await? {
        SignIn::Authorized(account) => account,
        SignIn::PasswordRequired { hint } => {
            println!("🔒 Two-factor authentication is enabled");
            if let Some(hint) = hint.filter(|h| !h.is_empty()) {
                println!("💡 Password hint: {hint}");
            }
            let password = prompt.ask_secret("🔑 Enter your 2FA password: ").await?;
            session.check_password(&password).await?
        }
    };

    println!("✅ Authentication successful!");
    print_account(&account);
    Ok(LoginOutcome::SignedIn(account))
}

fn print_account(account: &Account) {
    println!("👤 Logged in as: {}", account.full_name());
    if let Some(phone) = &account.phone {
        println!("📞 Phone: {phone}");
    }
}

pub fn print_setup_instructions() {
    println!("❌ ERROR: You need to set up your Telegram API credentials!");
    println!();
    println!("📋 Instructions:");
    println!("1. Go to https://my.telegram.org/auth");
    println!("2. Log in with your phone number");
    println!("3. Go to 'API Development tools'");
    println!("4. Create a new application (any name/description)");
    println!("5. Copy the API ID and API Hash");
    println!("6. Put API_ID, API_HASH and PHONE_NUMBER into your .env file");
    println!();
    println!("Then run the login again!");
}

fn print_common_issues() {
    println!();
    println!("💡 Common issues:");
    println!("- Wrong API_ID or API_HASH");
    println!("- Wrong phone number format (should include country code)");
    println!("- Network connection issues");
}
