//! `init.lua`: the bootstrap policy the engine loads at startup.
//!
//! # Responsibilities
//! - Static engine setup (spools, logs, bounce classifier, listeners)
//! - Load the four TOML artifacts by their configured paths
//! - Embed the `MAIL FROM` → source/pool/rate routing table
//! - Wire the routing, queue, signing and scrubbing hooks
//!
//! # Design Decisions
//! - No timestamps or run ids: identical inputs produce identical bytes
//! - Every interpolated value goes through `lua_str`

use std::path::Path;

use crate::config::{ArtifactLayout, ReconcilerConfig};
use crate::generate::{lua_str, pool_name, source_name};
use crate::store::Snapshot;

pub fn render(snapshot: &Snapshot, config: &ReconcilerConfig) -> String {
    let policy = &config.policy;
    let hostname = snapshot.hostname();
    let relay_hosts = relay_hosts(snapshot);

    let listen = snapshot
        .settings
        .as_ref()
        .and_then(|s| s.smtp_listen_addr.as_deref())
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .unwrap_or(policy.default_smtp_listen.as_str());

    let mut out = String::new();
    out.push_str("local kumo = require 'kumo'\n\n");
    out.push_str("kumo.on('init', function()\n");
    for spool in ["data", "meta"] {
        let path = format!("{}/{}", policy.spool_dir.trim_end_matches('/'), spool);
        out.push_str(&format!(
            "  kumo.define_spool {{\n    name = {},\n    path = {},\n    kind = 'LocalDisk',\n  }}\n\n",
            lua_str(spool),
            lua_str(&path)
        ));
    }
    out.push_str(&format!(
        "  kumo.configure_local_logs {{\n    log_dir = {},\n    max_segment_duration = '10 seconds',\n  }}\n\n",
        lua_str(&policy.log_dir)
    ));
    out.push_str(&format!(
        "  kumo.configure_bounce_classifier {{\n    files = {{ {} }},\n  }}\n\n",
        lua_str(&policy.bounce_classifier)
    ));
    out.push_str(&format!(
        "  kumo.start_http_listener {{\n    listen = {},\n    use_tls = false,\n    trusted_hosts = {{ '127.0.0.1' }},\n  }}\n\n",
        lua_str(&policy.http_listen)
    ));
    out.push_str(
        "  local trace_settings = {\n    received_header = false,\n    supplemental_header = true,\n    header_name = 'X-RefID',\n  }\n",
    );

    let listeners = std::iter::once(listen)
        .chain(policy.submission_listeners.iter().map(String::as_str));
    for addr in listeners {
        out.push_str(&format!(
            "\n  kumo.start_esmtp_listener {{\n    listen = {},\n    hostname = {},\n    banner = {},\n    relay_hosts = {{ {} }},\n    trace_headers = trace_settings,\n  }}\n",
            lua_str(addr),
            lua_str(hostname),
            lua_str(&format!("220 {hostname}")),
            relay_hosts
        ));
    }
    out.push_str("end)\n\n");

    render_data_loads(&mut out, &config.paths.layout());
    render_routes(&mut out, snapshot);
    out.push_str(HOOKS);
    out.push_str(&scrub_headers(hostname));
    out.push_str(INJECTION_PATHS);
    out.push_str(&format!(
        "\npcall(dofile, {})\n",
        lua_str(&policy.custom_hook)
    ));
    out
}

/// Loopback plus every non-empty relay IP from settings, as a Lua list body.
fn relay_hosts(snapshot: &Snapshot) -> String {
    let mut hosts = vec![lua_str("127.0.0.1")];
    if let Some(settings) = &snapshot.settings {
        hosts.extend(
            settings
                .relay_ips
                .iter()
                .map(|ip| ip.trim())
                .filter(|ip| !ip.is_empty() && *ip != "127.0.0.1")
                .map(lua_str),
        );
    }
    hosts.join(", ")
}

fn path_str(path: &Path) -> String {
    lua_str(&path.to_string_lossy())
}

fn render_data_loads(out: &mut String, layout: &ArtifactLayout) {
    out.push_str("-- Generated data files\n");
    out.push_str(&format!(
        "local sources_data = kumo.toml_load({})\n",
        path_str(&layout.sources)
    ));
    out.push_str(&format!(
        "local queues_data = kumo.toml_load({})\n",
        path_str(&layout.queues)
    ));
    out.push_str(&format!(
        "local listener_domains = kumo.toml_load({})\n",
        path_str(&layout.listener_domains)
    ));
    out.push_str(&format!(
        "local dkim_data = kumo.toml_load({})\n\n",
        path_str(&layout.dkim_data)
    ));
}

fn render_routes(out: &mut String, snapshot: &Snapshot) {
    out.push_str("-- MAIL FROM -> egress identity\n");
    out.push_str("local sender_routes = {\n");
    for (domain, sender) in snapshot.identities() {
        let rate = match sender.warmup.current_rate() {
            Some(rate) => lua_str(rate),
            None => "nil".to_string(),
        };
        out.push_str(&format!(
            "  [{}] = {{ source = {}, pool = {}, max_message_rate = {} }},\n",
            lua_str(&sender.email.to_lowercase()),
            lua_str(&source_name(domain, sender)),
            lua_str(&pool_name(domain, sender)),
            rate
        ));
    }
    out.push_str("}\n\n");
}

fn scrub_headers(hostname: &str) -> String {
    format!(
        r#"local function scrub_headers(msg)
  msg:remove_all_named_headers('User-Agent')
  msg:remove_all_named_headers('X-Mailer')
  msg:remove_all_named_headers('X-Originating-IP')
  msg:remove_x_headers {{ 'x-campaign', 'x-tenant', 'x-kumomta' }}

  msg:prepend_header('Received', string.format(
    "from %s ([%s])\r\n\tby %s with ESMTPS\r\n\tfor <%s>; %s",
    msg:get_meta('received_from_name') or 'localhost',
    msg:get_meta('received_from_ip') or '127.0.0.1',
    {},
    msg:recipient() or 'unknown',
    os.date('%a, %d %b %Y %H:%M:%S %z')
  ))
end

"#,
        lua_str(hostname)
    )
}

const HOOKS: &str = r#"local pool_routes = {}
for _, route in pairs(sender_routes) do
  pool_routes[route.pool] = route
end

local function route_for(email)
  if not email then
    return nil
  end
  return sender_routes[tostring(email):lower()]
end

kumo.on('smtp_server_mail_from', function(sender, conn_meta)
  local route = route_for(sender)
  if not route then
    kumo.reject(550, '5.7.1 sender not configured on this relay')
  end
  conn_meta:set_meta('tenant', route.pool)
end)

kumo.on('get_listener_domain', function(domain, listener, conn_meta)
  local cfg = listener_domains[domain]
  if cfg then
    return kumo.make_listener_domain {
      relay_to = cfg.relay_to or false,
      log_oob = cfg.log_oob or false,
      log_arf = cfg.log_arf or false,
    }
  end
  return kumo.make_listener_domain { relay_to = false }
end)

kumo.on('get_egress_pool', function(pool_name)
  local route = pool_routes[pool_name]
  if route and sources_data[route.source] then
    return kumo.make_egress_pool {
      name = pool_name,
      entries = { { name = route.source } },
    }
  end
  return kumo.make_egress_pool { name = pool_name, entries = {} }
end)

kumo.on('get_egress_source', function(source_name)
  local cfg = sources_data[source_name]
  if cfg then
    return kumo.make_egress_source {
      name = source_name,
      source_address = cfg.source_address,
      ehlo_domain = cfg.ehlo_domain,
    }
  end
  return kumo.make_egress_source { name = source_name }
end)

kumo.on('get_egress_path_config', function(domain, egress_source, site_name)
  return kumo.make_egress_path {
    enable_tls = 'OpportunisticInsecure',
    enable_mta_sts = false,
  }
end)

kumo.on('get_queue_config', function(domain, tenant, campaign, routing_domain)
  tenant = tenant or 'default'
  local cfg = queues_data['tenant:' .. tenant] or {}
  local route = pool_routes[tenant]
  local rate = cfg.max_message_rate
  if route and route.max_message_rate then
    rate = route.max_message_rate
  end
  return kumo.make_queue_config {
    egress_pool = cfg.egress_pool or tenant,
    retry_interval = cfg.retry_interval or '1m',
    max_age = cfg.max_age or '3d',
    max_message_rate = rate,
  }
end)

local function dkim_sign_message(msg)
  local from = msg:from_header()
  if not from then
    kumo.log_error('DKIM: missing From header')
    return
  end

  local email = from.email:lower()
  local domain = from.domain:lower()
  local domain_cfg = dkim_data.domain and dkim_data.domain[domain]
  if not domain_cfg or not domain_cfg.policy then
    kumo.log_error('DKIM: no signing config for ' .. domain)
    return
  end

  for _, policy in ipairs(domain_cfg.policy) do
    if email == policy.match_sender:lower() then
      msg:dkim_sign(kumo.dkim.rsa_sha256_signer {
        domain = domain,
        selector = policy.selector,
        headers = domain_cfg.headers,
        key = policy.filename,
      })
      return
    end
  end
  kumo.log_error('DKIM: no identity match for ' .. email)
end

local function assign_tenant(msg, tenant)
  if not tenant then
    local from = msg:from_header()
    local route = from and route_for(from.email)
    tenant = route and route.pool or 'default'
  end
  msg:set_meta('tenant', tenant)

  local campaign = msg:get_first_named_header_value('X-Campaign')
  if campaign then
    msg:set_meta('campaign', campaign)
  end
end

"#;

const INJECTION_PATHS: &str = r#"kumo.on('smtp_server_message_received', function(msg)
  assign_tenant(msg, nil)
  scrub_headers(msg)
  dkim_sign_message(msg)
end)

kumo.on('http_message_generated', function(msg)
  assign_tenant(msg, msg:get_first_named_header_value('X-Tenant'))
  scrub_headers(msg)
  dkim_sign_message(msg)
end)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::fixtures;
    use crate::store::Settings;

    #[test]
    fn test_routes_cover_every_identity() {
        let out = render(&fixtures::two_domains(), &ReconcilerConfig::default());

        assert!(out.contains(
            "['info@acme.io'] = { source = 'acme.io:info', pool = 'acme.io-info', max_message_rate = '100/hr' },"
        ));
        assert!(out.contains(
            "['news@zeta.io'] = { source = 'zeta.io:news', pool = 'zeta.io-news', max_message_rate = nil },"
        ));
    }

    #[test]
    fn test_listener_uses_settings() {
        let mut snapshot = fixtures::two_domains();
        if let Some(settings) = snapshot.settings.as_mut() {
            settings.smtp_listen_addr = Some("0.0.0.0:2525".into());
        }
        let out = render(&snapshot, &ReconcilerConfig::default());

        assert!(out.contains("listen = '0.0.0.0:2525'"));
        assert!(out.contains("hostname = 'mta.acme.io'"));
        assert!(out.contains("relay_hosts = { '127.0.0.1', '198.51.100.7' }"));
        assert_eq!(out.matches("kumo.start_esmtp_listener").count(), 3);
    }

    #[test]
    fn test_defaults_without_settings() {
        let out = render(&Snapshot::default(), &ReconcilerConfig::default());
        assert!(out.contains("listen = '127.0.0.1:25'"));
        assert!(out.contains("hostname = 'localhost'"));
        assert!(out.contains("relay_hosts = { '127.0.0.1' }"));
    }

    #[test]
    fn test_loads_configured_paths() {
        let mut config = ReconcilerConfig::default();
        config.paths.policy_dir = "/srv/policy".into();
        let out = render(&Snapshot::default(), &config);

        assert!(out.contains("kumo.toml_load('/srv/policy/sources.toml')"));
        assert!(out.contains("kumo.toml_load('/srv/policy/dkim_data.toml')"));
        assert!(out.ends_with("pcall(dofile, '/opt/kumomta/etc/policy/custom.lua')\n"));
    }

    #[test]
    fn test_hostname_is_escaped() {
        let snapshot = Snapshot::new(
            Some(Settings {
                main_hostname: "it's".into(),
                ..Default::default()
            }),
            vec![],
        );
        let out = render(&snapshot, &ReconcilerConfig::default());
        assert!(out.contains("hostname = 'it\\'s'"));
    }
}
