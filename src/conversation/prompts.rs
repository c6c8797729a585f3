//! User-facing reply texts and keyboards.
//!
//! All copy is Persian and sent verbatim; keep formatting intact when
//! editing.

use crate::channels::Keyboard;

/// The five capital-band labels. Input must match one exactly.
pub const CAPITAL_BANDS: [&str; 5] = [
    "۱- زیر ۱۰ میلیون",
    "۲- ۱۰ تا ۳۰ میلیون",
    "۳- ۳۰ تا ۱۰۰ میلیون",
    "۴- ۱۰۰ تا ۵۰۰ میلیون",
    "۵- بالای ۵۰۰ میلیون",
];

pub const WELCOME: &str = "سلام خوش اومدی 🎉
برای دریافت سبد مخصوص لطفا ثبت نام انجام بده

برای ادامه نام خودت رو وارد کن:";

pub const START_HINT: &str = "👋 سلام! برای شروع /start را ارسال کنید.";

pub const CANCELLED: &str = "❌ عملیات لغو شد!
برای شروع مجدد /start را ارسال کنید.";

pub const CANCELLED_INFO: &str = "❌ آخرین عملیات شما لغو شده بود.
برای شروع مجدد /start را ارسال کنید.";

pub const COMPLETED_INFO: &str = "✅ شما قبلاً فرآیند ثبت نام را تکمیل کرده‌اید.
برای شروع مجدد /start را ارسال کنید.";

pub const WAITING_PAYMENT: &str = "⏳ شما در حالت انتظار هستید.

💰 لطفاً ۲۰ دلار موجودی در صرافی شارژ کنید.
بعد از شارژ، فایل وبینار برای شما ارسال خواهد شد.
(ممکن است چند دقیقه طول بکشد)

برای شروع مجدد /start را ارسال کنید.";

pub const PHONE_PROMPT_BUTTON: &str = "📱 اشتراک شماره";

pub const CAPITAL_PROMPT: &str = "✅ شماره شما ثبت شد!

سرمایه مازاد شما چقدر است؟
از دکمه های زیر انتخاب کن";

pub const CAPITAL_RETRY: &str = "❌ لطفاً یکی از گزینه‌های موجود را انتخاب کنید:

سرمایه مازاد شما چقدر است؟";

pub const ACCOUNT_ID_PROMPT: &str = "✅ تبریک اطلاعات شما ثبت شد!

برای دریافت کانال مخصوص سبد VIP باید با لینک مخصوص اوتیس عضو صرافی شده باشید.

اگر قبلا با لینک اوتیس ثبت‌نام کرده اید (طبق تصویر) لطفا UID خود را ارسال کنید:


در غیر این صورت ابتدا با لینک زیر در صرافی ثبت‌نام کن
🔗 https://www.toobit.com/fa/activity/c/August-deposit?invite_code=Wr5Pbu

آموزش کامل ثبت‌نام و استفاده از صرافی:
🔗 https://t.me/otis_iran/837

سپس UID رو ارسال کن";

pub const PAYMENT_CONFIRMED: &str = "تایید نهایی🎉

لینک کانال مخصوص خدمت شما:
https://t.me/+DKxw_ESgji44MGU0";

pub const UNKNOWN_COMMAND: &str = "❓ دستور ناشناخته. برای راهنمایی /help را ارسال کنید.";

pub const ERROR_REPLY: &str = "❌ خطایی رخ داده است. لطفاً دوباره تلاش کنید.
در صورت تکرار مشکل /start را ارسال کنید.";

pub const HELP: &str = "راهنما:
/start — شروع ثبت نام
/cancel — لغو عملیات جاری
/help — همین راهنما";

pub const RETRY_HINT: &str = "لطفاً دوباره تلاش کنید یا /cancel برای لغو ارسال کنید.";

pub const PHONE_RETRY_HINT: &str = "لطفاً شماره معتبر وارد کنید یا /cancel برای لغو ارسال کنید.";

pub const ACCOUNT_ID_RETRY_HINT: &str = "لطفاً UID معتبر وارد کنید یا /cancel برای لغو ارسال کنید.";

/// Greeting after a valid name, asking for the phone number.
pub fn name_accepted(name: &str) -> String {
    format!(
        "✅ سلام {name}! 👋

حالا شماره همراهت رو با دکمه زیر برای ربات بفرست:"
    )
}

/// Summary of all collected fields, sent when onboarding data is complete.
pub fn registration_summary(name: &str, phone: &str, account_id: &str) -> String {
    format!(
        "✅ اطلاعات شما کامل ثبت شد!

📋 خلاصه اطلاعات:
👤 نام: {name}
📱 شماره: {phone}
🆔 UID: {account_id}

💰 حالا ۲۰ دلار باید موجودی در صرافی شارژ کنی.
بعد از شارژ منتظر بمون، طی چند دقیقه برات فایل وبینار ارسال میشه! ✨

⏰ وضعیت: در انتظار پرداخت"
    )
}

/// Validation failure reply: the reason verbatim plus retry guidance.
pub fn validation_reply(reason: &str, hint: &str) -> String {
    format!("❌ {reason}\n{hint}")
}

/// The capital-band choice keyboard.
pub fn capital_keyboard() -> Keyboard {
    Keyboard::Choices(CAPITAL_BANDS.iter().map(|s| s.to_string()).collect())
}
