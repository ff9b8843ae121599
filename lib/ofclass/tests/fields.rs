// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! One flow per match field: each must accept a frame carrying the
//! value and reject one that does not, in every strategy.

use ofclass::api::OFPVID_PRESENT;
use ofclass::api::ieh;
use ofclass::engine::field::ETHER_TYPE_IPV4;
use ofclass::engine::field::ETHER_TYPE_IPV6;
use ofclass::engine::headers::IP_PROTO_HOPOPT;
use ofclass::engine::headers::IP_PROTO_IPV6_ROUTE;
use ofclass_test_utils::*;

struct Case {
    name: &'static str,
    preds: Vec<MatchPredicate>,
    hit: FrameBuilder,
    miss: FrameBuilder,
}

fn case(
    name: &'static str,
    preds: Vec<MatchPredicate>,
    hit: FrameBuilder,
    miss: FrameBuilder,
) -> Case {
    Case { name, preds, hit, miss }
}

fn v4(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn v6(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

fn net(s: &str) -> Ipv4Cidr {
    s.parse().unwrap()
}

fn mac(s: &str) -> MacAddr {
    s.parse().unwrap()
}

fn ipv4() -> FrameBuilder {
    FrameBuilder::new().ipv4(v4("10.0.0.1"), v4("10.0.0.2"))
}

fn ipv6() -> FrameBuilder {
    FrameBuilder::new().ipv6(v6("fd00::1"), v6("fd00::2"))
}

fn arp() -> FrameBuilder {
    FrameBuilder::new().arp(
        1,
        mac("02:00:00:00:00:0a"),
        v4("10.1.1.1"),
        MacAddr::ZERO,
        v4("10.2.2.2"),
    )
}

fn cases() -> Vec<Case> {
    let is_v4 = MatchPredicate::eth_type(ETHER_TYPE_IPV4);
    let is_v6 = MatchPredicate::eth_type(ETHER_TYPE_IPV6);
    let target = v6("fd00::99");
    let lladdr = mac("02:aa:bb:cc:dd:ee");

    vec![
        // Link layer.
        case(
            "eth_src_masked",
            vec![MatchPredicate::eth_src_masked(
                mac("02:00:00:aa:00:00"),
                mac("ff:ff:ff:ff:00:00"),
            )],
            FrameBuilder::new().eth(DST_MAC, mac("02:00:00:aa:12:34")),
            FrameBuilder::new().eth(DST_MAC, mac("02:00:00:ab:12:34")),
        ),
        case(
            "vlan_pcp",
            vec![MatchPredicate::vlan_pcp(5)],
            FrameBuilder::new().vlan(10, 5),
            FrameBuilder::new().vlan(10, 4),
        ),
        case(
            "vlan_none",
            vec![MatchPredicate::vlan_none()],
            FrameBuilder::new(),
            FrameBuilder::new().vlan(10, 0),
        ),
        case(
            "any_vlan",
            vec![MatchPredicate::vlan_vid_masked(
                OFPVID_PRESENT,
                OFPVID_PRESENT,
            )],
            FrameBuilder::new().vlan(77, 0),
            FrameBuilder::new(),
        ),
        case(
            "outer_tag",
            vec![MatchPredicate::vlan_vid(20)],
            FrameBuilder::new().qinq(20).vlan(30, 0),
            FrameBuilder::new().vlan(30, 0),
        ),
        case(
            "pbb_isid",
            vec![MatchPredicate::pbb_isid(0x12_3456)],
            FrameBuilder::new().pbb(0x12_3456),
            FrameBuilder::new().pbb(0x12_3457),
        ),
        case(
            "pbb_isid_masked",
            vec![MatchPredicate::pbb_isid_masked(0x12_0000, 0xff_0000)],
            FrameBuilder::new().pbb(0x12_abcd),
            FrameBuilder::new().pbb(0x13_abcd),
        ),
        case(
            "mpls_tc",
            vec![MatchPredicate::mpls_tc(3)],
            ipv4().mpls(16, 3),
            ipv4().mpls(16, 2),
        ),
        case(
            "mpls_bos",
            vec![MatchPredicate::mpls_bos(true)],
            ipv4().mpls(16, 0),
            ipv4().mpls(16, 0).mpls(17, 0),
        ),
        // IPv4.
        case(
            "ipv4_dscp",
            vec![is_v4.clone(), MatchPredicate::ip_dscp(46)],
            ipv4().dscp_ecn(46, 0),
            ipv4().dscp_ecn(45, 0),
        ),
        case(
            "ipv4_ecn",
            vec![is_v4.clone(), MatchPredicate::ip_ecn(3)],
            ipv4().dscp_ecn(46, 3),
            ipv4().dscp_ecn(46, 1),
        ),
        case(
            "ipv4_src",
            vec![MatchPredicate::ipv4_src(v4("10.0.0.1"))],
            ipv4(),
            FrameBuilder::new().ipv4(v4("10.0.0.3"), v4("10.0.0.2")),
        ),
        case(
            "icmpv4",
            vec![
                MatchPredicate::icmpv4_type(8),
                MatchPredicate::icmpv4_code(0),
            ],
            ipv4().icmpv4(8, 0),
            ipv4().icmpv4(0, 0),
        ),
        // IPv6.
        case(
            "ipv6_dscp",
            vec![is_v6.clone(), MatchPredicate::ip_dscp(46)],
            ipv6().dscp_ecn(46, 1),
            ipv6().dscp_ecn(10, 1),
        ),
        case(
            "ipv6_ecn",
            vec![is_v6, MatchPredicate::ip_ecn(1)],
            ipv6().dscp_ecn(46, 1),
            ipv6().dscp_ecn(46, 2),
        ),
        case(
            "ipv6_flabel_masked",
            vec![MatchPredicate::ipv6_flabel_masked(0x1_2000, 0xf_f000)],
            ipv6().flabel(0x1_2abc),
            ipv6().flabel(0x2_2abc),
        ),
        case(
            "ipv6_src_prefix",
            vec![MatchPredicate::ipv6_src_prefix("fd00::/16".parse().unwrap())],
            ipv6(),
            FrameBuilder::new().ipv6(v6("fe80::1"), v6("fd00::2")),
        ),
        case(
            "ip_proto_past_exthdrs",
            vec![MatchPredicate::ip_proto(17)],
            ipv6().ipv6_ext(IP_PROTO_HOPOPT).udp(1, 2),
            ipv6().ipv6_ext(IP_PROTO_HOPOPT).tcp(1, 2),
        ),
        case(
            "ipv6_exthdr_masked",
            vec![MatchPredicate::ipv6_exthdr_masked(ieh::HOP, ieh::HOP)],
            ipv6().ipv6_ext(IP_PROTO_HOPOPT).ipv6_ext(IP_PROTO_IPV6_ROUTE),
            ipv6().ipv6_ext(IP_PROTO_IPV6_ROUTE),
        ),
        case(
            "ipv6_exthdr",
            vec![MatchPredicate::ipv6_exthdr(ieh::ROUTER)],
            ipv6().ipv6_ext(IP_PROTO_IPV6_ROUTE).udp(1, 2),
            ipv6()
                .ipv6_ext(IP_PROTO_HOPOPT)
                .ipv6_ext(IP_PROTO_IPV6_ROUTE)
                .udp(1, 2),
        ),
        case(
            "icmpv6",
            vec![
                MatchPredicate::icmpv6_type(128),
                MatchPredicate::icmpv6_code(0),
            ],
            ipv6().icmpv6(128, 0),
            ipv6().icmpv6(129, 0),
        ),
        case(
            "nd_target",
            vec![MatchPredicate::ipv6_nd_target(target)],
            ipv6().nd_ns(target, None),
            ipv6().nd_ns(v6("fd00::98"), None),
        ),
        case(
            "nd_sll",
            vec![MatchPredicate::ipv6_nd_sll(lladdr)],
            ipv6().nd_ns(target, Some(lladdr)),
            ipv6().nd_ns(target, None),
        ),
        case(
            "nd_tll",
            vec![MatchPredicate::ipv6_nd_tll(lladdr)],
            ipv6().nd_na(target, Some(lladdr)),
            // A source link-layer option is not a target one.
            ipv6().nd_ns(target, Some(lladdr)),
        ),
        // ARP.
        case(
            "arp_op",
            vec![MatchPredicate::arp_op(1)],
            arp(),
            FrameBuilder::new().arp(
                2,
                lladdr,
                v4("10.1.1.1"),
                lladdr,
                v4("10.2.2.2"),
            ),
        ),
        case(
            "arp_spa_prefix",
            vec![MatchPredicate::arp_spa_prefix(net("10.1.0.0/16"))],
            arp(),
            FrameBuilder::new().arp(
                1,
                lladdr,
                v4("10.9.1.1"),
                lladdr,
                v4("10.2.2.2"),
            ),
        ),
        case(
            "arp_tpa_prefix",
            vec![MatchPredicate::arp_tpa_prefix(net("10.2.2.0/24"))],
            arp(),
            FrameBuilder::new().arp(
                1,
                lladdr,
                v4("10.1.1.1"),
                lladdr,
                v4("10.2.3.2"),
            ),
        ),
        case(
            "arp_sha_tha",
            vec![
                MatchPredicate::arp_sha(mac("02:00:00:00:00:0a")),
                MatchPredicate::arp_tha(MacAddr::ZERO),
            ],
            arp(),
            FrameBuilder::new().arp(
                1,
                mac("02:00:00:00:00:0a"),
                v4("10.1.1.1"),
                MacAddr::BROADCAST,
                v4("10.2.2.2"),
            ),
        ),
        // Transport.
        case(
            "udp_ports",
            vec![MatchPredicate::udp_src(68), MatchPredicate::udp_dst(67)],
            ipv4().udp(68, 67),
            ipv4().udp(67, 68),
        ),
        case(
            "sctp_ports",
            vec![
                MatchPredicate::sctp_src(1000),
                MatchPredicate::sctp_dst(2000),
            ],
            ipv4().sctp(1000, 2000),
            ipv4().sctp(1000, 2001),
        ),
        case(
            "tcp_dst_first_fragment_only",
            vec![MatchPredicate::tcp_dst(80)],
            ipv4().tcp(1234, 80),
            ipv4().tcp(1234, 80).later_fragment(),
        ),
        case(
            "ip_proto_on_later_fragment",
            vec![MatchPredicate::ip_proto(6)],
            ipv6().tcp(1234, 80).later_fragment(),
            ipv6().udp(1234, 80).later_fragment(),
        ),
    ]
}

#[test]
fn every_field_matches_and_rejects() {
    for strategy in STRATEGIES {
        for c in cases() {
            let table = test_table(strategy, 4);
            let id = table.add(FlowSpec::new(1).with_matches(c.preds)).unwrap();

            let hit = c.hit.build();
            let pkt = PacketView::parse(&hit, 1).unwrap();
            assert_eq!(
                table.classify(&pkt, None).map(|f| f.id()),
                Some(id),
                "{strategy}: {} rejects its frame",
                c.name,
            );

            let miss = c.miss.build();
            let pkt = PacketView::parse(&miss, 1).unwrap();
            assert!(
                table.classify(&pkt, None).is_none(),
                "{strategy}: {} accepts the wrong frame",
                c.name,
            );
        }
    }
}

#[test]
fn out_of_band_fields() {
    for strategy in STRATEGIES {
        let table = test_table(strategy, 8);
        let phy = table
            .add(FlowSpec::new(3).with_match(MatchPredicate::in_phy_port(9)))
            .unwrap();
        let tun = table
            .add(FlowSpec::new(2).with_match(
                MatchPredicate::tunnel_id_masked(0xab_0000, 0xff_0000),
            ))
            .unwrap();
        let port = table
            .add(FlowSpec::new(1).with_match(MatchPredicate::in_port(4)))
            .unwrap();

        let frame = FrameBuilder::new().build();
        let classify =
            |pkt: PacketView| table.classify(&pkt, None).map(|f| f.id());

        let on_port = PacketView::parse(&frame, 4).unwrap();
        assert_eq!(classify(on_port.clone()), Some(port), "{strategy}");
        assert_eq!(
            classify(on_port.clone().with_tunnel_id(0xab_1234)),
            Some(tun),
            "{strategy}"
        );
        assert_eq!(
            classify(on_port.with_tunnel_id(0xab_1234).with_in_phy_port(9)),
            Some(phy),
            "{strategy}"
        );
        // The physical port follows the logical one unless told
        // otherwise.
        let on_phy = PacketView::parse(&frame, 9).unwrap();
        assert_eq!(classify(on_phy), Some(phy), "{strategy}");
    }
}

#[test]
fn truncated_frames() {
    assert!(PacketView::parse(&[0u8; 13], 1).is_err());

    // An IPv4 header cut short leaves only the Ethernet fields.
    let mut frame = ipv4().udp(1, 2).build();
    frame.truncate(20);
    let table = test_table(Strategy::Tree, 4);
    let id = table
        .add(FlowSpec::new(1).with_match(MatchPredicate::eth_type(
            ETHER_TYPE_IPV4,
        )))
        .unwrap();
    table
        .add(
            FlowSpec::new(2)
                .with_match(MatchPredicate::ipv4_src(v4("10.0.0.1"))),
        )
        .unwrap();
    let pkt = PacketView::parse(&frame, 1).unwrap();
    assert_eq!(table.classify(&pkt, None).unwrap().id(), id);
}
