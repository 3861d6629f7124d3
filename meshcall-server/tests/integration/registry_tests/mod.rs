mod test_relay_routing;
