use std::collections::BTreeMap;

use core_types::UiLanguage;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    zh_cn: BTreeMap<&'static str, &'static str>,
    en_us: BTreeMap<&'static str, &'static str>,
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            zh_cn: zh_cn_map(),
            en_us: en_us_map(),
        }
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        match self.lang {
            UiLanguage::ZhCn => self
                .zh_cn
                .get(key)
                .copied()
                .or_else(|| self.en_us.get(key).copied())
                .unwrap_or(key),
            UiLanguage::EnUs => self
                .en_us
                .get(key)
                .copied()
                .or_else(|| self.zh_cn.get(key).copied())
                .unwrap_or(key),
        }
    }

    /// Like [`I18n::t`], replacing `{name}` placeholders.
    pub fn tf(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.t(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}

fn zh_cn_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "日记"),
        ("mode.guest", "访客模式"),
        ("mode.authenticated", "已登录"),
        ("guest.warning", "📝 访客日记仅临时保存，关闭应用后将会丢失。"),
        ("guest.discard_confirm", "登录将丢弃 {count} 条访客日记，是否继续？[y/N]"),
        ("register.success", "注册成功，现在可以登录了。"),
        ("register.failed", "注册失败"),
        ("login.success", "登录成功。"),
        ("login.failed", "登录失败"),
        ("login.cancelled", "已取消登录。"),
        ("logout.done", "已退出登录。"),
        ("profile.failed", "获取用户信息失败"),
        ("entries.empty", "暂无日记。"),
        ("entry.created", "已创建日记 {id}。"),
        ("entry.updated", "已更新日记 {id}。"),
        (
            "entry.nothing_to_update",
            "没有要修改的内容。用法：edit <id> [--mood <心情>] [内容...]",
        ),
        ("entry.deleted", "已删除日记 {id}。"),
        ("entry.failed", "日记操作失败"),
        ("shell.unknown", "无法识别的命令，输入 help 查看帮助。"),
        ("shell.bye", "再见。"),
    ])
}

fn en_us_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "Journal"),
        ("mode.guest", "guest mode"),
        ("mode.authenticated", "signed in"),
        (
            "guest.warning",
            "📝 Guest entries are temporary and will be lost when you close the app.",
        ),
        (
            "guest.discard_confirm",
            "Logging in discards {count} guest entries. Continue? [y/N]",
        ),
        ("register.success", "Registration Success. You can now log in."),
        ("register.failed", "Registration Failed"),
        ("login.success", "Logged in."),
        ("login.failed", "Login Failed"),
        ("login.cancelled", "Login cancelled."),
        ("logout.done", "Logged out."),
        ("profile.failed", "Profile Unavailable"),
        ("entries.empty", "No entries yet."),
        ("entry.created", "Created entry {id}."),
        ("entry.updated", "Updated entry {id}."),
        (
            "entry.nothing_to_update",
            "Nothing to change. Usage: edit <id> [--mood <mood>] [text...]",
        ),
        ("entry.deleted", "Deleted entry {id}."),
        ("entry.failed", "Entry Operation Failed"),
        ("shell.unknown", "Unrecognized command, type `help` for usage."),
        ("shell.bye", "Bye."),
    ])
}
