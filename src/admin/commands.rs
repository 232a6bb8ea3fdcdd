//! The `!` command table.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;

use super::{AdminError, BanScope};
use crate::config::store::{format_duration, parse_duration};
use crate::security::{BanEntry, BanList};
use crate::state::{ConnId, Hub, Rights};

type Run = fn(&mut Invocation<'_>) -> Result<String, AdminError>;

/// One `!` command.
pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    /// Needed to run it. `NONE` is open to everyone.
    pub right: Rights,
    pub summary: &'static str,
    run: Run,
}

macro_rules! command {
    ($name:literal, $usage:literal, $right:expr, $summary:literal, $run:expr) => {
        Command {
            name: $name,
            usage: $usage,
            right: $right,
            summary: $summary,
            run: $run,
        }
    };
}

pub static COMMANDS: &[Command] = &[
    command!("help", "!help", Rights::NONE, "list the commands you can use", help),
    command!("ban", "!ban <nick> <duration> [reason]", Rights::BAN, "ban a nick and its address", ban),
    command!("banip", "!banip <ip[/bits]> <duration> [reason]", Rights::BAN, "ban an address or network", ban_ip),
    command!("hardban", "!hardban <ip[/bits]> <duration> [reason]", Rights::BAN, "refuse connections from a network", hard_ban),
    command!("unban", "!unban <nick>", Rights::BAN, "lift the bans on a nick", unban),
    command!("unbanip", "!unbanip <ip[/bits]>", Rights::BAN, "lift a soft ban on a network", unban_ip),
    command!("unhardban", "!unhardban <ip[/bits]>", Rights::BAN, "lift a hard ban on a network", unhard_ban),
    command!("bans", "!bans [nick]", Rights::BAN, "list soft bans", bans),
    command!("hardbans", "!hardbans", Rights::BAN, "list hard bans", hard_bans),
    command!("kick", "!kick <nick> [reason]", Rights::KICK, "disconnect and briefly ban a user", kick),
    command!("drop", "!drop <nick> [reason]", Rights::KICK, "disconnect a user", drop_user),
    command!("adduser", "!adduser <nick> <group> [password]", Rights::USER, "register a nick", add_user),
    command!("deluser", "!deluser <nick>", Rights::USER, "unregister a nick", del_user),
    command!("setpass", "!setpass <nick> <password>", Rights::USER, "set a user's password", set_pass),
    command!("passwd", "!passwd <password>", Rights::NONE, "change your own password", passwd),
    command!("groupadd", "!groupadd <group> <rights>", Rights::GROUP, "create or change a group", group_add),
    command!("groupdel", "!groupdel <group>", Rights::GROUP, "delete an empty group", group_del),
    command!("grant", "!grant <nick> <rights>", Rights::GROUP, "give a user extra rights", grant),
    command!("revoke", "!revoke <nick> <rights>", Rights::GROUP, "take extra rights away", revoke),
    command!("users", "!users", Rights::GROUP, "list registered users", users),
    command!("groups", "!groups", Rights::GROUP, "list groups", groups),
    command!("show", "!show [key]", Rights::CONFIG, "show configuration", show),
    command!("set", "!set <key> <value>", Rights::CONFIG, "change configuration", set),
    command!("save", "!save", Rights::CONFIG, "write bans and accounts to disk", save),
    command!("load", "!load", Rights::CONFIG, "reload bans and accounts from disk", load),
    command!("stats", "!stats", Rights::OP, "hub statistics", stats),
];

/// First whitespace-separated word and the trimmed rest.
pub(crate) fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim()),
        None => (s, ""),
    }
}

/// Run command `name` for `id`.
pub(crate) fn run(hub: &mut Hub, id: ConnId, name: &str, args: &str) -> Result<String, AdminError> {
    let command = COMMANDS
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| AdminError::UnknownCommand(name.to_string()))?;
    let Some(user) = hub.user(id) else {
        return Ok(String::new());
    };
    if !user.has(command.right) {
        return Err(AdminError::Unauthorized(command.name));
    }
    let op = user.nick.clone();
    let mut inv = Invocation {
        hub,
        id,
        op,
        rest: args,
        usage: command.usage,
    };
    (command.run)(&mut inv)
}

struct Invocation<'a> {
    hub: &'a mut Hub,
    id: ConnId,
    /// Nick of the invoker.
    op: String,
    rest: &'a str,
    usage: &'static str,
}

impl<'a> Invocation<'a> {
    fn arg(&mut self) -> Result<&'a str, AdminError> {
        self.opt_arg().ok_or(AdminError::Usage(self.usage))
    }

    fn opt_arg(&mut self) -> Option<&'a str> {
        let (word, rest) = split_word(self.rest);
        self.rest = rest;
        (!word.is_empty()).then_some(word)
    }

    /// Everything not consumed yet.
    fn rest(&mut self) -> &'a str {
        std::mem::take(&mut self.rest)
    }

    fn required_rest(&mut self) -> Result<&'a str, AdminError> {
        let rest = self.rest();
        if rest.is_empty() {
            Err(AdminError::Usage(self.usage))
        } else {
            Ok(rest)
        }
    }

    fn reason(&mut self) -> &'a str {
        match self.rest() {
            "" => "no reason given",
            reason => reason,
        }
    }

    /// Ban length in seconds, 0 for permanent.
    fn duration(&mut self) -> Result<u64, AdminError> {
        let raw = self.arg()?;
        parse_duration(raw)
            .map(|d| d.as_secs())
            .ok_or_else(|| AdminError::BadDuration(raw.to_string()))
    }

    /// `a.b.c.d` or `a.b.c.d/bits`.
    fn network(&mut self) -> Result<Ipv4Net, AdminError> {
        let raw = self.arg()?;
        let net = match raw.parse::<Ipv4Net>() {
            Ok(net) => net,
            Err(_) => raw
                .parse::<Ipv4Addr>()
                .map(Ipv4Net::from)
                .map_err(|_| AdminError::BadAddress(raw.to_string()))?,
        };
        Ok(net.trunc())
    }

    fn rights(&mut self) -> Result<Rights, AdminError> {
        Ok(Rights::parse(self.required_rest()?)?)
    }

    /// Connection of an online nick.
    fn online(&self, nick: &str) -> Result<ConnId, AdminError> {
        self.hub
            .find_nick(nick)
            .filter(|id| self.hub.user(*id).is_some_and(|u| u.is_online()))
            .ok_or_else(|| AdminError::NotOnline(nick.to_string()))
    }
}

fn span(secs: u64) -> String {
    if secs == 0 {
        "permanently".to_string()
    } else {
        format!("for {}", format_duration(Duration::from_secs(secs)))
    }
}

fn listing(title: &str, lines: Vec<String>) -> String {
    if lines.is_empty() {
        return format!("{title}: none.");
    }
    let mut out = format!("{title} ({}):", lines.len());
    for line in lines {
        out.push('\n');
        out.push_str(&line);
    }
    out
}

fn describe(entry: &BanEntry, now: i64) -> String {
    let net = entry
        .network()
        .map_or_else(|| entry.ip.to_string(), |net| net.to_string());
    let target = match &entry.nick {
        Some(nick) if entry.is_ip_ban() => format!("{nick} ({net})"),
        Some(nick) => nick.clone(),
        None => net,
    };
    let left = match entry.remaining(now) {
        Some(left) => format!("{} left", format_duration(Duration::from_secs(left as u64))),
        None => "permanent".to_string(),
    };
    format!("{target} by {}: {}, {left}", entry.op, entry.reason)
}

fn list_bans(list: &BanList, now: i64, nick: Option<&str>) -> Vec<String> {
    list.iter()
        .map(|(_, entry)| entry)
        .filter(|entry| !entry.is_expired(now))
        .filter(|entry| match nick {
            Some(nick) => entry
                .nick
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(nick)),
            None => true,
        })
        .map(|entry| describe(entry, now))
        .collect()
}

fn help(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let rights = inv.hub.user(inv.id).map_or(Rights::NONE, |u| u.rights);
    let mut out = String::from("Commands:");
    for command in COMMANDS.iter().filter(|c| rights.contains(c.right)) {
        let _ = write!(out, "\n{} - {}", command.usage, command.summary);
    }
    Ok(out)
}

fn ban(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let secs = inv.duration()?;
    let reason = inv.reason();
    inv.hub
        .apply_ban(&inv.op, BanScope::User(nick.to_string()), secs, reason)?;
    Ok(format!("{nick} banned {}.", span(secs)))
}

fn ban_ip(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let net = inv.network()?;
    let secs = inv.duration()?;
    let reason = inv.reason();
    let dropped = inv.hub.apply_ban(&inv.op, BanScope::Ip(net), secs, reason)?;
    Ok(format!("{net} banned {}, {dropped} dropped.", span(secs)))
}

fn hard_ban(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let net = inv.network()?;
    let secs = inv.duration()?;
    let reason = inv.reason();
    let dropped = inv.hub.apply_ban(&inv.op, BanScope::HardIp(net), secs, reason)?;
    Ok(format!("{net} hard-banned {}, {dropped} dropped.", span(secs)))
}

fn unban(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    match inv.hub.soft_bans.delete_by_nick(nick) {
        0 => Err(AdminError::NotFound(nick.to_string())),
        n => Ok(format!("{n} ban(s) on {nick} lifted.")),
    }
}

fn unban_ip(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let net = inv.network()?;
    match inv.hub.soft_bans.delete_by_ip(net.network(), net.netmask()) {
        0 => Err(AdminError::NotFound(net.to_string())),
        n => Ok(format!("{n} ban(s) on {net} lifted.")),
    }
}

fn unhard_ban(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let net = inv.network()?;
    match inv.hub.hard_bans.delete_by_ip(net.network(), net.netmask()) {
        0 => Err(AdminError::NotFound(net.to_string())),
        n => Ok(format!("{n} hard ban(s) on {net} lifted.")),
    }
}

fn bans(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.opt_arg();
    let now = inv.hub.wall();
    Ok(listing("Bans", list_bans(&inv.hub.soft_bans, now, nick)))
}

fn hard_bans(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let now = inv.hub.wall();
    Ok(listing("Hard bans", list_bans(&inv.hub.hard_bans, now, None)))
}

fn kick(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let target = inv.online(nick)?;
    let reason = inv.reason();
    inv.hub.kick(&inv.op, target, reason)?;
    Ok(format!("{nick} kicked."))
}

fn drop_user(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let target = inv.online(nick)?;
    let reason = inv.reason();
    inv.hub.drop_user(&inv.op, target, reason)?;
    Ok(format!("{nick} dropped."))
}

fn add_user(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let group = inv.arg()?;
    let password = inv.opt_arg();
    let now = inv.hub.wall();
    inv.hub
        .accounts
        .add_account(nick, group, password, &inv.op, now)?;
    inv.hub.refresh_rights(nick);
    Ok(format!("{nick} registered in {group}."))
}

fn del_user(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    inv.hub.accounts.remove_account(nick)?;
    inv.hub.refresh_rights(nick);
    Ok(format!("{nick} unregistered."))
}

fn set_pass(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let password = inv.arg()?;
    inv.hub.accounts.set_password(nick, password)?;
    Ok(format!("Password for {nick} changed."))
}

fn passwd(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let password = inv.arg()?;
    if inv.hub.accounts.account(&inv.op).is_none() {
        return Err(AdminError::Unauthorized("passwd"));
    }
    inv.hub.accounts.set_password(&inv.op, password)?;
    Ok("Your password was changed.".to_string())
}

/// Group rights changed: re-read everyone registered.
fn refresh_registered(hub: &mut Hub) {
    let nicks: Vec<String> = hub
        .sessions
        .values()
        .filter(|s| s.user.registered)
        .map(|s| s.user.nick.clone())
        .collect();
    for nick in nicks {
        hub.refresh_rights(&nick);
    }
}

fn group_add(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let group = inv.arg()?;
    let rights = inv.rights()?;
    inv.hub.accounts.set_group(group, rights);
    refresh_registered(inv.hub);
    Ok(format!("Group {group}: {rights}."))
}

fn group_del(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let group = inv.arg()?;
    inv.hub.accounts.remove_group(group)?;
    Ok(format!("Group {group} deleted."))
}

fn grant(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let rights = inv.rights()?;
    let now = inv.hub.accounts.grant(nick, rights)?;
    inv.hub.refresh_rights(nick);
    Ok(format!("{nick} now holds {now} on top of their group."))
}

fn revoke(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let nick = inv.arg()?;
    let rights = inv.rights()?;
    let now = inv.hub.accounts.revoke(nick, rights)?;
    inv.hub.refresh_rights(nick);
    Ok(format!("{nick} now holds {now} on top of their group."))
}

fn users(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let accounts = &inv.hub.accounts;
    let lines = accounts
        .accounts()
        .map(|account| {
            let rights = accounts.rights_of(&account.nick).unwrap_or(Rights::NONE);
            format!(
                "{} [{}] {}, added by {}",
                account.nick, account.group, rights, account.registered_by
            )
        })
        .collect();
    Ok(listing("Users", lines))
}

fn groups(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let lines = inv
        .hub
        .accounts
        .groups()
        .map(|group| format!("{}: {}", group.name, group.rights))
        .collect();
    Ok(listing("Groups", lines))
}

fn show(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let prefix = inv.opt_arg().unwrap_or("");
    if !prefix.is_empty() {
        if let Ok(value) = inv.hub.config_get(prefix) {
            return Ok(format!("{prefix} = {value}"));
        }
    }
    let lines: Vec<String> = inv
        .hub
        .config_list(prefix)
        .into_iter()
        .map(|(key, kind, value)| format!("{key} = {value} ({kind})"))
        .collect();
    if lines.is_empty() {
        return Err(AdminError::NotFound(prefix.to_string()));
    }
    Ok(listing("Config", lines))
}

fn set(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let key = inv.arg()?;
    let value = inv.required_rest()?;
    if !inv.hub.config_set(key, value)? {
        return Err(AdminError::Vetoed);
    }
    Ok(format!("{key} = {}", inv.hub.config_get(key)?))
}

fn save(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    inv.hub.save()?;
    Ok("State saved.".to_string())
}

fn load(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let errors = inv.hub.load();
    if errors.is_empty() {
        return Ok("State loaded.".to_string());
    }
    let lines = errors.iter().map(ToString::to_string).collect();
    Ok(listing("Load errors", lines))
}

fn stats(inv: &mut Invocation<'_>) -> Result<String, AdminError> {
    let hub = &inv.hub;
    Ok(hub
        .stats
        .report(hub.online_count(), hub.cachelist.len(), hub.buffered_total()))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::admin::{ReplyVia, execute};
    use crate::handlers::{NmdcProtocol, ProtocolHandler};
    use crate::state::test_support::*;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn oper(hub: &mut Hub, rights: Rights) -> (ConnId, crate::network::mock::MockTransport) {
        let (id, out) = online(hub, ip(200), "oper");
        hub.user_mut(id).unwrap().rights.insert(rights);
        out.take_sent();
        (id, out)
    }

    #[test]
    fn test_split_word() {
        assert_eq!(split_word("  ban  mallory 1h spam "), ("ban", "mallory 1h spam"));
        assert_eq!(split_word("stats"), ("stats", ""));
        assert_eq!(split_word(""), ("", ""));
    }

    #[test]
    fn test_help_lists_only_permitted_commands() {
        let mut hub = Hub::new(test_config());
        let (id, _) = online(&mut hub, ip(1), "alice");
        let text = run(&mut hub, id, "help", "").unwrap();
        assert!(text.contains("!help"));
        assert!(text.contains("!passwd"));
        assert!(!text.contains("!ban "));

        hub.user_mut(id).unwrap().rights.insert(Rights::BAN);
        assert!(run(&mut hub, id, "help", "").unwrap().contains("!ban <nick>"));
    }

    #[test]
    fn test_unknown_and_unauthorized() {
        let mut hub = Hub::new(test_config());
        let (id, _) = online(&mut hub, ip(1), "alice");
        assert!(matches!(run(&mut hub, id, "frobnicate", ""), Err(AdminError::UnknownCommand(_))));
        assert!(matches!(run(&mut hub, id, "ban", "bob 1h"), Err(AdminError::Unauthorized("ban"))));
    }

    #[test]
    fn test_ban_from_main_chat() {
        let mut hub = Hub::new(test_config());
        let (op, op_out) = oper(&mut hub, Rights::BAN);
        let (_, victim_out) = online(&mut hub, ip(1), "mallory");

        NmdcProtocol::new().handle_token(&mut hub, op, b"<oper> !ban mallory 1h spamming");
        assert_eq!(op_out.take_sent(), "<HubSec> mallory banned for 1h.|");
        assert!(victim_out.is_closed());
        assert!(hub.soft_ban_for("mallory", ip(1)).is_some());

        let listed = run(&mut hub, op, "bans", "mallory").unwrap();
        assert!(listed.starts_with("Bans (1):\nmallory (10.0.0.1/32) by oper: spamming, 1h left"));

        assert_eq!(run(&mut hub, op, "unban", "mallory").unwrap(), "1 ban(s) on mallory lifted.");
        assert!(hub.soft_ban_for("mallory", ip(1)).is_none());
    }

    #[test]
    fn test_ban_usage_and_bad_duration() {
        let mut hub = Hub::new(test_config());
        let (op, _) = oper(&mut hub, Rights::BAN);
        let err = run(&mut hub, op, "ban", "mallory").unwrap_err();
        assert_eq!(err.to_string(), "Usage: !ban <nick> <duration> [reason]");
        assert!(matches!(
            run(&mut hub, op, "ban", "mallory soon"),
            Err(AdminError::BadDuration(_))
        ));
    }

    #[test]
    fn test_banip_and_hardban_networks() {
        let mut hub = Hub::new(test_config());
        let (op, _) = oper(&mut hub, Rights::BAN);
        let (_, out) = online(&mut hub, Ipv4Addr::new(192, 0, 2, 10), "alice");

        let reply = run(&mut hub, op, "banip", "192.0.2.77/24 0 open proxy").unwrap();
        assert_eq!(reply, "192.0.2.0/24 banned permanently, 1 dropped.");
        assert!(out.is_closed());

        run(&mut hub, op, "hardban", "198.51.100.4 2h").unwrap();
        assert!(hub.admit(Ipv4Addr::new(198, 51, 100, 4)).is_err());
        assert!(run(&mut hub, op, "hardbans", "").unwrap().contains("198.51.100.4/32 by oper"));
        run(&mut hub, op, "unhardban", "198.51.100.4").unwrap();
        assert!(hub.admit(Ipv4Addr::new(198, 51, 100, 4)).is_ok());

        assert!(matches!(
            run(&mut hub, op, "banip", "not-an-ip 1h"),
            Err(AdminError::BadAddress(_))
        ));
    }

    #[test]
    fn test_kick_and_drop() {
        let mut hub = Hub::new(test_config());
        let (op, _) = oper(&mut hub, Rights::KICK);
        let (_, alice_out) = online(&mut hub, ip(1), "alice");
        let (_, bob_out) = online(&mut hub, ip(2), "bob");

        assert_eq!(run(&mut hub, op, "kick", "alice flooding").unwrap(), "alice kicked.");
        assert!(alice_out.is_closed());
        assert!(hub.soft_ban_for("alice", ip(1)).is_some());

        assert_eq!(run(&mut hub, op, "drop", "bob").unwrap(), "bob dropped.");
        assert!(bob_out.is_closed());
        assert!(hub.soft_ban_for("bob", ip(2)).is_none());

        assert!(matches!(run(&mut hub, op, "kick", "nobody"), Err(AdminError::NotOnline(_))));
    }

    #[test]
    fn test_account_management_updates_online_rights() {
        let mut hub = Hub::new(test_config());
        let (op, _) = oper(&mut hub, Rights::USER | Rights::GROUP);
        let (alice, _) = online(&mut hub, ip(1), "alice");

        run(&mut hub, op, "groupadd", "vip chat,pm,search,dl,tag").unwrap();
        assert_eq!(run(&mut hub, op, "adduser", "alice vip").unwrap(), "alice registered in vip.");
        assert!(hub.user(alice).unwrap().registered);
        assert!(hub.user(alice).unwrap().has(Rights::TAG));

        run(&mut hub, op, "grant", "alice kick").unwrap();
        assert!(hub.user(alice).unwrap().has(Rights::KICK));
        run(&mut hub, op, "revoke", "alice kick").unwrap();
        assert!(!hub.user(alice).unwrap().has(Rights::KICK));

        run(&mut hub, op, "groupadd", "vip chat").unwrap();
        assert!(!hub.user(alice).unwrap().has(Rights::TAG));

        assert!(run(&mut hub, op, "users", "").unwrap().contains("alice [vip] chat, added by oper"));
        assert!(matches!(run(&mut hub, op, "groupdel", "vip"), Err(AdminError::Account(_))));

        run(&mut hub, op, "deluser", "alice").unwrap();
        assert!(!hub.user(alice).unwrap().registered);
        run(&mut hub, op, "groupdel", "vip").unwrap();
        assert!(!run(&mut hub, op, "groups", "").unwrap().contains("vip"));
    }

    #[test]
    fn test_passwd_needs_an_account() {
        let mut hub = Hub::new(test_config());
        let (alice, _) = online(&mut hub, ip(1), "alice");
        assert!(matches!(run(&mut hub, alice, "passwd", "secret"), Err(AdminError::Unauthorized(_))));

        hub.accounts.set_group("reg", Rights::CHAT);
        hub.accounts.add_account("alice", "reg", None, "owner", 0).unwrap();
        run(&mut hub, alice, "passwd", "secret").unwrap();
        assert!(hub.accounts.requires_password("alice"));
    }

    #[test]
    fn test_show_and_set() {
        let mut hub = Hub::new(test_config());
        let (op, _) = oper(&mut hub, Rights::CONFIG);
        assert_eq!(run(&mut hub, op, "set", "hub.name Elsewhere").unwrap(), "hub.name = Elsewhere");
        assert_eq!(hub.config().hub.name, "Elsewhere");
        assert_eq!(run(&mut hub, op, "show", "hub.name").unwrap(), "hub.name = Elsewhere");
        assert!(run(&mut hub, op, "show", "login").unwrap().contains("login.lock_length"));
        assert!(matches!(run(&mut hub, op, "set", "hub.nope 1"), Err(AdminError::Config(_))));
        assert!(matches!(run(&mut hub, op, "show", "zzz"), Err(AdminError::NotFound(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.files.banlist = dir.path().join("bans.json").display().to_string();
        config.files.hardbanlist = dir.path().join("hardbans.json").display().to_string();
        config.files.accounts = dir.path().join("accounts.json").display().to_string();
        let mut hub = Hub::new(config);
        let (op, _) = oper(&mut hub, Rights::CONFIG | Rights::BAN);

        run(&mut hub, op, "ban", "ghost 0 gone").unwrap();
        assert_eq!(run(&mut hub, op, "save", "").unwrap(), "State saved.");
        run(&mut hub, op, "unban", "ghost").unwrap();
        assert_eq!(run(&mut hub, op, "load", "").unwrap(), "State loaded.");
        assert!(hub.soft_ban_for("ghost", ip(1)).is_some());
    }

    #[test]
    fn test_stats_requires_op() {
        let mut hub = Hub::new(test_config());
        let (op, out) = oper(&mut hub, Rights::OP);
        execute(&mut hub, op, "stats", ReplyVia::Private);
        let sent = out.take_sent();
        assert!(sent.starts_with("$To: oper From: HubSec $<HubSec> Users online: 1"));
    }
}
